//! Command-line arguments understood by the generation engine.

use suite_core::{EngineConfig, SearchAlgorithm, TargetScope};

use crate::types::EngineRequest;

/// Generation entry point for `algorithm`.
pub fn generate_flag(algorithm: SearchAlgorithm) -> &'static str {
    if algorithm.is_many_objective() {
        "-generateMOSuite"
    } else if algorithm == SearchAlgorithm::RandomSearch {
        "-generateTests"
    } else {
        "-generateSuite"
    }
}

/// `-Dcriterion=...` with every enabled criterion, `LINE` when none is.
pub fn criterion_arg(settings: &EngineConfig) -> String {
    let names = settings.criteria.enabled_names();
    if names.is_empty() {
        "-Dcriterion=LINE".to_string()
    } else {
        format!("-Dcriterion={}", names.join(":"))
    }
}

/// Settings that differ from the engine's own defaults.
fn changed_settings(settings: &EngineConfig) -> Vec<String> {
    let defaults = EngineConfig::default();
    let mut params = Vec::new();
    if settings.sandbox != defaults.sandbox {
        params.push(format!("-Dsandbox={}", settings.sandbox));
    }
    if settings.assertions != defaults.assertions {
        params.push(format!("-Dassertions={}", settings.assertions));
    }
    if settings.algorithm != defaults.algorithm {
        params.push(format!("-Dalgorithm={}", settings.algorithm));
    }
    if settings.junit_check != defaults.junit_check {
        params.push(format!("-Djunit_check={}", settings.junit_check));
    }
    if settings.minimize != defaults.minimize {
        params.push(format!("-Dminimize={}", settings.minimize));
    }
    params
}

/// Ordered engine arguments for one request. Exactly one targeting mode is
/// emitted: class only, or class plus method, or class plus line.
pub fn engine_arguments(request: &EngineRequest, settings: &EngineConfig) -> Vec<String> {
    let mut args = vec![
        generate_flag(settings.algorithm).to_string(),
        "-serializeResult".to_string(),
        "-serializeResultPath".to_string(),
        request.result_path().display().to_string(),
        "-base_dir".to_string(),
        request.project_root.display().to_string(),
        "-projectCP".to_string(),
        request.classpath.clone(),
        "-Dnew_statistics=false".to_string(),
        "-class".to_string(),
        request.class_fqn.clone(),
        "-Dtest_naming_strategy=COVERAGE".to_string(),
    ];

    match &request.scope {
        TargetScope::Class => {}
        TargetScope::Method { descriptor } => args.push(format!("-Dtarget_method={descriptor}")),
        TargetScope::Line { line } => args.push(format!("-Dtarget_line={line}")),
    }

    args.extend(changed_settings(settings));
    args.push(criterion_arg(settings));

    if let Some(seed) = settings.seed.as_deref().filter(|seed| !seed.trim().is_empty()) {
        args.push(format!("-seed={seed}"));
    }
    if let Some(id) = settings
        .configuration_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
    {
        args.push(format!("-Dconfiguration_id={id}"));
    }
    args
}
