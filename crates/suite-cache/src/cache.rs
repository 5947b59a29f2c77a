//! Line-indexed cache of previously generated test cases.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use suite_core::{FileId, GenerationReport, JobDescriptor, TestCase};
use tracing::debug;

use crate::slot::{SlotArena, SlotId};
use crate::snapshot::{CacheSnapshot, EntrySnapshot, FileSnapshot};

const HASH_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct EntryId(u64);

#[derive(Debug)]
struct CachedTestCase {
    name: String,
    code: String,
    job: Option<JobDescriptor>,
    covered: BTreeSet<SlotId>,
}

#[derive(Debug)]
struct LineCache {
    slot: SlotId,
    entries: Vec<EntryId>,
}

/// Everything cached for one source file. Keys of `lines` always equal the
/// current line of their slot.
#[derive(Debug, Default)]
struct FileCache {
    slots: SlotArena,
    lines: BTreeMap<u32, LineCache>,
    entries: HashMap<EntryId, CachedTestCase>,
    by_code: HashMap<String, EntryId>,
    next_entry: u64,
}

impl FileCache {
    fn insert(&mut self, test: &TestCase, job: Option<&JobDescriptor>) -> bool {
        let lines: BTreeSet<u32> = test
            .covered_lines
            .iter()
            .copied()
            .filter(|line| *line > 0)
            .collect();
        if lines.is_empty() {
            return false;
        }

        if let Some(previous) = self.by_code.get(&test.test_code).copied() {
            self.remove_entry(previous);
        }

        let id = EntryId(self.next_entry);
        self.next_entry += 1;

        let slots = &mut self.slots;
        let mut covered = BTreeSet::new();
        for line in lines {
            let line_cache = self.lines.entry(line).or_insert_with(|| LineCache {
                slot: slots.alloc(line),
                entries: Vec::new(),
            });
            line_cache.entries.push(id);
            covered.insert(line_cache.slot);
        }

        self.by_code.insert(test.test_code.clone(), id);
        self.entries.insert(
            id,
            CachedTestCase {
                name: test.test_name.clone(),
                code: test.test_code.clone(),
                job: job.cloned(),
                covered,
            },
        );
        true
    }

    /// Drops an entry and unlinks it from every line it covered.
    fn remove_entry(&mut self, id: EntryId) -> Option<CachedTestCase> {
        let entry = self.entries.remove(&id)?;
        if self.by_code.get(&entry.code) == Some(&id) {
            self.by_code.remove(&entry.code);
        }

        for slot in &entry.covered {
            let line = self.slots.line(*slot);
            let now_empty = match self.lines.get_mut(&line) {
                Some(line_cache) => {
                    line_cache.entries.retain(|other| *other != id);
                    line_cache.entries.is_empty()
                }
                None => false,
            };
            if now_empty {
                if let Some(line_cache) = self.lines.remove(&line) {
                    self.slots.release(line_cache.slot);
                }
            }
        }
        Some(entry)
    }

    fn remove_entries(&mut self, ids: BTreeSet<EntryId>) -> usize {
        ids.into_iter()
            .filter_map(|id| self.remove_entry(id))
            .count()
    }

    fn entries_in_range(&self, from: u32, to: u32) -> Vec<EntryId> {
        if from > to {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        self.lines
            .range(from..=to)
            .flat_map(|(_, line_cache)| line_cache.entries.iter().copied())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    fn invalidate_range(&mut self, from: u32, to: u32) -> usize {
        let ids = self.entries_in_range(from, to).into_iter().collect();
        self.remove_entries(ids)
    }

    fn invalidate_set(&mut self, lines: &BTreeSet<u32>) -> usize {
        let ids = lines
            .iter()
            .filter_map(|line| self.lines.get(line))
            .flat_map(|line_cache| line_cache.entries.iter().copied())
            .collect();
        self.remove_entries(ids)
    }

    fn shift(&mut self, from_line: u32, delta: i64) {
        let from_line = from_line.max(1);
        // Lines cannot move below line 1.
        let delta = delta.max(1 - i64::from(from_line));
        if delta == 0 {
            return;
        }

        if delta < 0 {
            let swallowed_from = (i64::from(from_line) + delta) as u32;
            self.invalidate_range(swallowed_from, from_line - 1);
        } else {
            // Lines pushed past u32::MAX fall off the end of the file.
            let last_kept = i64::from(u32::MAX) - delta;
            if last_kept < i64::from(from_line) {
                self.invalidate_range(from_line, u32::MAX);
            } else if last_kept < i64::from(u32::MAX) {
                self.invalidate_range(last_kept as u32 + 1, u32::MAX);
            }
        }

        let moved = self.lines.split_off(&from_line);
        for (line, line_cache) in moved {
            let target = u32::try_from(i64::from(line) + delta).unwrap_or(u32::MAX);
            self.slots.set_line(line_cache.slot, target);
            self.lines.insert(target, line_cache);
        }
    }

    fn snapshot(&self, file_id: &FileId) -> FileSnapshot {
        let mut ids: Vec<&EntryId> = self.entries.keys().collect();
        ids.sort();
        FileSnapshot {
            file_id: file_id.clone(),
            entries: ids
                .into_iter()
                .filter_map(|id| self.entries.get(id))
                .map(|entry| EntrySnapshot {
                    name: entry.name.clone(),
                    code: entry.code.clone(),
                    job: entry.job.clone(),
                    lines: entry
                        .covered
                        .iter()
                        .map(|slot| self.slots.line(*slot))
                        .collect(),
                })
                .collect(),
        }
    }

    fn to_test_case(&self, entry: &CachedTestCase) -> TestCase {
        TestCase {
            test_name: format!("{} (cached, {})", entry.name, content_hash(&entry.code)),
            test_code: entry.code.clone(),
            covered_lines: entry
                .covered
                .iter()
                .map(|slot| self.slots.line(*slot))
                .collect(),
            covered_branches: Vec::new(),
            covered_mutants: Vec::new(),
        }
    }
}

/// Short content hash used to tag cached test names.
pub fn content_hash(code: &str) -> String {
    let hash = blake3::hash(code.as_bytes()).to_hex();
    hash.as_str()[..HASH_PREFIX_LEN].to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-file test case cache.
///
/// The outer lock only guards get-or-create of a file; structural changes
/// take the per-file lock.
#[derive(Debug, Default)]
pub struct TestCaseCache {
    files: Mutex<HashMap<FileId, Arc<Mutex<FileCache>>>>,
}

impl TestCaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn file(&self, file_id: &FileId) -> Option<Arc<Mutex<FileCache>>> {
        lock(&self.files).get(file_id).cloned()
    }

    fn file_or_create(&self, file_id: &FileId) -> Arc<Mutex<FileCache>> {
        lock(&self.files)
            .entry(file_id.clone())
            .or_default()
            .clone()
    }

    /// Indexes every test case of `report` under each line it covers.
    /// Returns the number of test cases stored.
    pub fn put(&self, file_id: &FileId, report: &GenerationReport) -> usize {
        self.put_inner(file_id, report, None)
    }

    /// Like [`TestCaseCache::put`], remembering the job that produced the report.
    pub fn put_for_job(
        &self,
        file_id: &FileId,
        report: &GenerationReport,
        job: &JobDescriptor,
    ) -> usize {
        self.put_inner(file_id, report, Some(job))
    }

    fn put_inner(
        &self,
        file_id: &FileId,
        report: &GenerationReport,
        job: Option<&JobDescriptor>,
    ) -> usize {
        let file = self.file_or_create(file_id);
        let mut file = lock(&file);
        let stored = report
            .test_cases()
            .filter(|test| file.insert(test, job))
            .count();
        debug!(file = %file_id, stored, "cached test cases");
        stored
    }

    /// Deduplicated test cases covering any line in `from..=to`, in
    /// insertion order per line.
    pub fn get(&self, file_id: &FileId, from: u32, to: u32) -> Vec<TestCase> {
        let Some(file) = self.file(file_id) else {
            return Vec::new();
        };
        let file = lock(&file);
        file.entries_in_range(from, to)
            .into_iter()
            .filter_map(|id| file.entries.get(&id))
            .map(|entry| file.to_test_case(entry))
            .collect()
    }

    /// Query-side name for [`TestCaseCache::get`].
    pub fn retrieve(&self, file_id: &FileId, from: u32, to: u32) -> Vec<TestCase> {
        self.get(file_id, from, to)
    }

    /// Drops every entry covering a line in `from..=to`, from all of its
    /// lines. Returns the number of dropped entries.
    pub fn invalidate(&self, file_id: &FileId, from: u32, to: u32) -> usize {
        let Some(file) = self.file(file_id) else {
            return 0;
        };
        let dropped = lock(&file).invalidate_range(from, to);
        if dropped > 0 {
            debug!(file = %file_id, from, to, dropped, "invalidated cached tests");
        }
        dropped
    }

    pub fn invalidate_lines(&self, file_id: &FileId, lines: &BTreeSet<u32>) -> usize {
        if lines.is_empty() {
            return 0;
        }
        let Some(file) = self.file(file_id) else {
            return 0;
        };
        let dropped = lock(&file).invalidate_set(lines);
        if dropped > 0 {
            debug!(file = %file_id, lines = lines.len(), dropped, "invalidated cached tests");
        }
        dropped
    }

    /// Drops the entry whose code equals `test_code`.
    pub fn invalidate_test(&self, file_id: &FileId, test_code: &str) -> bool {
        let Some(file) = self.file(file_id) else {
            return false;
        };
        let mut file = lock(&file);
        match file.by_code.get(test_code).copied() {
            Some(id) => file.remove_entry(id).is_some(),
            None => false,
        }
    }

    pub fn job_for_test(&self, file_id: &FileId, test_code: &str) -> Option<JobDescriptor> {
        let file = self.file(file_id)?;
        let file = lock(&file);
        let id = file.by_code.get(test_code)?;
        file.entries.get(id).and_then(|entry| entry.job.clone())
    }

    /// Renumbers every line at or after `from_line` by `delta`. A negative
    /// delta first invalidates the lines the deletion swallowed.
    pub fn shift_lines(&self, file_id: &FileId, from_line: u32, delta: i64) {
        if let Some(file) = self.file(file_id) {
            lock(&file).shift(from_line, delta);
            debug!(file = %file_id, from_line, delta, "shifted cached lines");
        }
    }

    /// Copies every file's entries out, files sorted by id.
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut files: Vec<(FileId, Arc<Mutex<FileCache>>)> = lock(&self.files)
            .iter()
            .map(|(file_id, file)| (file_id.clone(), Arc::clone(file)))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        CacheSnapshot {
            files: files
                .into_iter()
                .map(|(file_id, file)| lock(&file).snapshot(&file_id))
                .filter(|file| !file.entries.is_empty())
                .collect(),
        }
    }

    /// Re-inserts the entries of `snapshot` on top of the current contents.
    /// Returns the number of entries stored.
    pub fn restore(&self, snapshot: &CacheSnapshot) -> usize {
        let mut stored = 0;
        for file_snapshot in &snapshot.files {
            let file = self.file_or_create(&file_snapshot.file_id);
            let mut file = lock(&file);
            for entry in &file_snapshot.entries {
                let test = TestCase::new(
                    entry.name.clone(),
                    entry.code.clone(),
                    entry.lines.iter().copied(),
                );
                if file.insert(&test, entry.job.as_ref()) {
                    stored += 1;
                }
            }
        }
        debug!(stored, files = snapshot.files.len(), "restored cached test cases");
        stored
    }

    pub fn entry_count(&self, file_id: &FileId) -> usize {
        self.file(file_id)
            .map(|file| lock(&file).entries.len())
            .unwrap_or(0)
    }

    pub fn indexed_lines(&self, file_id: &FileId) -> Vec<u32> {
        self.file(file_id)
            .map(|file| lock(&file).lines.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{content_hash, TestCaseCache};
    use crate::snapshot::CacheSnapshot;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;
    use suite_core::{FileId, GenerationReport, JobDescriptor, JobId, TestCase};

    fn report(tests: Vec<TestCase>) -> GenerationReport {
        GenerationReport::from_test_cases("org.example.Pizza", tests)
    }

    fn base_names(tests: &[TestCase]) -> Vec<String> {
        tests
            .iter()
            .map(|test| {
                test.test_name
                    .split(' ')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn retrieve_then_invalidate_middle_line_drops_whole_test() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(&file, &report(vec![TestCase::new("test_foo", "foo()", [5, 6, 7])]));

        assert_eq!(base_names(&cache.retrieve(&file, 6, 6)), vec!["test_foo"]);

        assert_eq!(cache.invalidate(&file, 6, 6), 1);
        assert!(cache.retrieve(&file, 5, 7).is_empty());
        assert!(cache.indexed_lines(&file).is_empty());
    }

    #[test]
    fn range_retrieval_matches_coverage_intersection() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("a", "a()", [1, 2]),
                TestCase::new("b", "b()", [4]),
                TestCase::new("c", "c()", [2, 10]),
            ]),
        );

        for (from, to) in [(1, 1), (2, 3), (3, 3), (4, 9), (1, 10), (11, 20)] {
            let mut got = base_names(&cache.get(&file, from, to));
            got.sort();
            let mut expected: Vec<String> = [("a", vec![1, 2]), ("b", vec![4]), ("c", vec![2, 10])]
                .into_iter()
                .filter(|(_, lines)| lines.iter().any(|line| (from..=to).contains(line)))
                .map(|(name, _)| name.to_string())
                .collect();
            expected.sort();
            assert_eq!(got, expected, "range {from}..={to}");
        }
    }

    #[test]
    fn retrieval_is_deduplicated_and_decorated() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(&file, &report(vec![TestCase::new("t", "t()", [3, 4, 5])]));

        let tests = cache.get(&file, 1, 100);
        assert_eq!(tests.len(), 1);
        let test = &tests[0];
        assert_eq!(test.test_name, format!("t (cached, {})", content_hash("t()")));
        assert_eq!(test.test_code, "t()");
        assert_eq!(test.covered_lines, BTreeSet::from([3, 4, 5]));
        assert!(test.covered_branches.is_empty());
        assert!(test.covered_mutants.is_empty());
    }

    #[test]
    fn unknown_file_and_inverted_range_are_empty() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        assert!(cache.get(&file, 1, 10).is_empty());
        cache.put(&file, &report(vec![TestCase::new("t", "t()", [3])]));
        assert!(cache.get(&file, 5, 2).is_empty());
        assert_eq!(cache.invalidate(&file, 5, 2), 0);
        assert_eq!(cache.invalidate(&FileId::new("other"), 1, 10), 0);
    }

    #[test]
    fn invalidation_leaves_unrelated_lines_alone() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("a", "a()", [1, 2]),
                TestCase::new("b", "b()", [2, 3]),
                TestCase::new("c", "c()", [8]),
            ]),
        );

        assert_eq!(cache.invalidate(&file, 1, 1), 1);
        assert_eq!(base_names(&cache.get(&file, 1, 3)), vec!["b"]);
        assert_eq!(base_names(&cache.get(&file, 8, 8)), vec!["c"]);
        assert_eq!(cache.indexed_lines(&file), vec![2, 3, 8]);
    }

    #[test]
    fn identical_code_replaces_the_earlier_entry() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(&file, &report(vec![TestCase::new("old", "same()", [1, 2])]));
        cache.put(&file, &report(vec![TestCase::new("new", "same()", [2, 3])]));

        assert_eq!(cache.entry_count(&file), 1);
        assert!(cache.get(&file, 1, 1).is_empty());
        let tests = cache.get(&file, 1, 3);
        assert_eq!(base_names(&tests), vec!["new"]);
        assert_eq!(tests[0].covered_lines, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_without_coverage_is_not_stored() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        let stored = cache.put(
            &file,
            &report(vec![
                TestCase::new("empty", "e()", Vec::<u32>::new()),
                TestCase::new("zero", "z()", [0]),
            ]),
        );
        assert_eq!(stored, 0);
        assert_eq!(cache.entry_count(&file), 0);
    }

    #[test]
    fn invalidate_lines_and_single_test() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("a", "a()", [1]),
                TestCase::new("b", "b()", [5]),
                TestCase::new("c", "c()", [9]),
            ]),
        );

        assert_eq!(cache.invalidate_lines(&file, &BTreeSet::from([1, 9, 40])), 2);
        assert_eq!(base_names(&cache.get(&file, 1, 10)), vec!["b"]);

        assert!(cache.invalidate_test(&file, "b()"));
        assert!(!cache.invalidate_test(&file, "b()"));
        assert_eq!(cache.entry_count(&file), 0);
    }

    #[test]
    fn job_for_test_returns_originating_job() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        let job = JobDescriptor::new(
            file.clone(),
            "org.example.Pizza",
            7,
            JobId::new("test_gen_result_1"),
            "target/classes",
        );
        cache.put_for_job(&file, &report(vec![TestCase::new("a", "a()", [1])]), &job);
        cache.put(&file, &report(vec![TestCase::new("b", "b()", [2])]));

        assert_eq!(cache.job_for_test(&file, "a()"), Some(job));
        assert_eq!(cache.job_for_test(&file, "b()"), None);
        assert_eq!(cache.job_for_test(&file, "missing()"), None);
    }

    #[test]
    fn inserted_lines_shift_every_covering_entry() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("a", "a()", [2, 10]),
                TestCase::new("b", "b()", [10, 11]),
            ]),
        );

        cache.shift_lines(&file, 5, 3);

        assert!(cache.get(&file, 10, 11).is_empty());
        let tests = cache.get(&file, 13, 13);
        assert_eq!(base_names(&tests), vec!["a", "b"]);
        assert_eq!(tests[0].covered_lines, BTreeSet::from([2, 13]));
        assert_eq!(tests[1].covered_lines, BTreeSet::from([13, 14]));
    }

    #[test]
    fn deleted_lines_invalidate_swallowed_entries_then_shift() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("gone", "g()", [5, 12]),
                TestCase::new("kept", "k()", [3, 9]),
            ]),
        );

        // Lines 5 and 6 deleted: line 7 becomes line 5.
        cache.shift_lines(&file, 7, -2);

        assert_eq!(cache.entry_count(&file), 1);
        let tests = cache.get(&file, 1, 20);
        assert_eq!(base_names(&tests), vec!["kept"]);
        assert_eq!(tests[0].covered_lines, BTreeSet::from([3, 7]));
    }

    #[test]
    fn deletion_past_the_top_of_file_is_clamped() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(&file, &report(vec![TestCase::new("t", "t()", [1, 4])]));
        cache.put(&file, &report(vec![TestCase::new("u", "u()", [6])]));

        cache.shift_lines(&file, 3, -10);

        assert_eq!(cache.indexed_lines(&file), vec![4]);
        assert_eq!(base_names(&cache.get(&file, 4, 4)), vec!["u"]);
    }

    #[test]
    fn huge_insertion_drops_lines_pushed_past_the_end() {
        let cache = TestCaseCache::new();
        let file = FileId::new("F");
        cache.put(
            &file,
            &report(vec![
                TestCase::new("low", "low()", [2]),
                TestCase::new("high", "high()", [u32::MAX - 5]),
                TestCase::new("near", "near()", [10]),
            ]),
        );

        cache.shift_lines(&file, 5, 100);

        assert_eq!(cache.entry_count(&file), 2);
        assert_eq!(cache.indexed_lines(&file), vec![2, 110]);
        assert_eq!(base_names(&cache.get(&file, 110, 110)), vec!["near"]);

        cache.shift_lines(&file, 3, i64::from(u32::MAX) + 7);
        assert_eq!(cache.indexed_lines(&file), vec![2]);
        assert_eq!(base_names(&cache.get(&file, 1, u32::MAX)), vec!["low"]);
    }

    #[test]
    fn snapshot_restores_into_a_fresh_cache() {
        let cache = TestCaseCache::new();
        let file = FileId::new("Pizza.java");
        let job = JobDescriptor::new(
            file.clone(),
            "org.example.Pizza",
            4,
            JobId::new("J7"),
            "target/classes",
        );
        cache.put_for_job(
            &file,
            &report(vec![
                TestCase::new("a", "a()", [5, 6]),
                TestCase::new("b", "b()", [9]),
            ]),
            &job,
        );
        cache.shift_lines(&file, 6, 2);
        cache.put(&FileId::new("Empty.java"), &report(vec![TestCase::new("x", "x()", [1])]));
        cache.invalidate(&FileId::new("Empty.java"), 1, 1);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.entry_count(), 2);
        assert_eq!(snapshot.files[0].entries[0].lines, vec![5, 8]);

        let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
        let decoded: CacheSnapshot = serde_json::from_str(&json).expect("parse snapshot");

        let restored = TestCaseCache::new();
        assert_eq!(restored.restore(&decoded), 2);
        assert_eq!(base_names(&restored.get(&file, 8, 8)), vec!["a"]);
        assert_eq!(base_names(&restored.get(&file, 11, 11)), vec!["b"]);
        assert!(restored.get(&file, 6, 6).is_empty());
        assert_eq!(restored.job_for_test(&file, "b()"), Some(job));
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn concurrent_puts_on_different_files_do_not_interfere() {
        let cache = Arc::new(TestCaseCache::new());
        let handles: Vec<_> = (0..4)
            .map(|index| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let file = FileId::new(format!("F{index}"));
                    for line in 1..=50u32 {
                        cache.put(
                            &file,
                            &report(vec![TestCase::new(
                                format!("t{line}"),
                                format!("code{line}"),
                                [line],
                            )]),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        for index in 0..4 {
            let file = FileId::new(format!("F{index}"));
            assert_eq!(cache.entry_count(&file), 50);
            assert_eq!(cache.get(&file, 10, 19).len(), 10);
        }
    }
}
