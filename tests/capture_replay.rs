//! Capture followed by replay, driven by scripted build traces.

mod fixtures;

use fixtures::{build_command, cold_trace, library_trace, warm_trace, ScriptedDriver, WARM_LINK_LINE};
use relink::capture::{fingerprint_for, run_capture, CaptureError, CaptureOptions, CaptureReport};
use relink::config::EffectiveConfig;
use relink::replay::{self, resolve_arguments, ReplayError, ReplayPaths, ReplayPlan};
use relink_store::{Argument, Fingerprint, RecapturePolicy, TagSet};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn options(db: &Path) -> CaptureOptions {
    CaptureOptions {
        db_path: db.to_path_buf(),
        tags: None,
        policy: RecapturePolicy::Append,
        max_attempts: 3,
    }
}

fn output_in(dir: &TempDir) -> String {
    dir.path().join("hello").display().to_string()
}

// =============================================================================
// Capture
// =============================================================================

#[test]
fn test_replay_differs_only_at_placeholders() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    let driver = ScriptedDriver::new(vec![warm_trace()]);

    let summary = run_capture(&driver, &command, &options(&db)).unwrap();
    assert_eq!(summary.invocations.len(), 1);
    assert_eq!(driver.builds(), 1);

    let fingerprint = fingerprint_for(&command, None);
    let cached = replay::load(&db, &fingerprint).unwrap();

    // resolving against the observed paths gives back the observed line
    let observed = resolve_arguments(
        &cached.arguments,
        cached.entry_artifact.as_ref(),
        ReplayPaths {
            output: "/tmp/go-build42/b001/exe/a.out",
            importcfg: "/tmp/go-build42/b001/importcfg.link",
        },
    )
    .unwrap();
    assert_eq!(observed.join(" "), WARM_LINK_LINE);

    let fresh = resolve_arguments(
        &cached.arguments,
        cached.entry_artifact.as_ref(),
        ReplayPaths {
            output: "/tmp/fresh/out",
            importcfg: "/tmp/fresh/importcfg.link",
        },
    )
    .unwrap();
    let original: Vec<&str> = WARM_LINK_LINE.split_whitespace().collect();
    assert_eq!(fresh.len(), original.len());
    for (position, (arg, token)) in cached.arguments.iter().zip(&fresh).enumerate() {
        if !matches!(arg, Argument::OutputPath | Argument::ImportcfgPath) {
            assert_eq!(token, original[position], "position {}", position);
        }
    }
}

#[test]
fn test_entry_artifact_recorded() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);

    run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let cached = replay::load(&db, &fingerprint_for(&command, None)).unwrap();
    let entry = cached.entry_artifact.expect("entry artifact");
    assert_eq!(entry.package, "example.com/hello");
    assert_eq!(cached.arguments.last(), Some(&Argument::MainPackage));
    assert_eq!(cached.artifacts.len(), 3);
    assert_eq!(cached.manifest_lines.len(), 1);
}

#[test]
fn test_warming_accepts_second_attempt() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    let driver = ScriptedDriver::new(vec![cold_trace(), warm_trace()]);

    run_capture(&driver, &command, &options(&db)).unwrap();
    assert_eq!(driver.builds(), 2);
    assert_eq!(*driver.env_queries.borrow(), 1);

    let cached = replay::load(&db, &fingerprint_for(&command, None)).unwrap();
    assert!(cached.artifacts.iter().all(|a| a.file.starts_with(fixtures::GOCACHE)));
    assert!(cached.manifest().iter().all(|l| !l.contains("/tmp/go-build41")));
}

#[test]
fn test_unstable_cache_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    let driver = ScriptedDriver::new(vec![cold_trace(), cold_trace(), cold_trace()]);

    let err = run_capture(&driver, &command, &options(&db)).unwrap_err();
    assert!(matches!(err, CaptureError::CacheUnstable { attempts: 3 }));
    assert_eq!(err.exit_code(), 6);
    assert!(!db.exists());
}

#[test]
fn test_max_attempts_is_honored() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    let driver = ScriptedDriver::new(vec![cold_trace(), warm_trace()]);

    let mut opts = options(&db);
    opts.max_attempts = 1;
    let err = run_capture(&driver, &command, &opts).unwrap_err();
    assert!(matches!(err, CaptureError::CacheUnstable { attempts: 1 }));
    assert_eq!(driver.builds(), 1);
}

#[test]
fn test_library_build_has_nothing_to_cache() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);

    let err = run_capture(&ScriptedDriver::new(vec![library_trace()]), &command, &options(&db)).unwrap_err();
    assert!(matches!(err, CaptureError::NothingToCache));
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn test_failed_build_propagates() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);

    let err = run_capture(&ScriptedDriver::new(vec![]), &command, &options(&db)).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.child_output(), Some("no more scripted traces\n"));
}

#[test]
fn test_command_tags_form_fingerprint() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let output = output_in(&dir);
    let command = build_command(&output, &["-tags", "osusergo,netgo"]);

    run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let tagged = Fingerprint::new(output.as_str(), TagSet::new(["netgo", "osusergo"]));
    assert!(replay::load(&db, &tagged).is_ok());

    let untagged = Fingerprint::new(output.as_str(), TagSet::default());
    let err = replay::load(&db, &untagged).unwrap_err();
    assert!(matches!(err, ReplayError::CacheMiss { .. }));
}

#[test]
fn test_replace_policy_on_recapture() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);

    let first = run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();
    let mut opts = options(&db);
    opts.policy = RecapturePolicy::Replace;
    let second = run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &opts).unwrap();

    assert_eq!(first.invocations[0].invocation_id, second.invocations[0].invocation_id);
    assert!(!second.invocations[0].created);

    let cached = replay::load(&db, &fingerprint_for(&command, None)).unwrap();
    assert_eq!(cached.arguments.len(), WARM_LINK_LINE.split_whitespace().count());
    assert_eq!(cached.artifacts.len(), 3);
}

#[test]
fn test_append_with_changed_link_command_is_refused() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let changed = warm_trace().replace("-extld=gcc", "-extld=gcc -s");
    let err = run_capture(&ScriptedDriver::new(vec![changed.clone()]), &command, &options(&db)).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("--replace"));

    let cached = replay::load(&db, &fingerprint_for(&command, None)).unwrap();
    assert_eq!(cached.arguments.len(), WARM_LINK_LINE.split_whitespace().count());

    let mut opts = options(&db);
    opts.policy = RecapturePolicy::Replace;
    run_capture(&ScriptedDriver::new(vec![changed]), &command, &opts).unwrap();
    let cached = replay::load(&db, &fingerprint_for(&command, None)).unwrap();
    assert_eq!(cached.arguments.len(), WARM_LINK_LINE.split_whitespace().count() + 1);
}

#[test]
fn test_capture_report_carries_config_sources() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    let summary = run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let config = EffectiveConfig::builtin().unwrap();
    let json = serde_json::to_value(CaptureReport::new(summary, &config.sources)).unwrap();
    assert_eq!(json["fingerprint"]["program"], output_in(&dir).as_str());
    assert_eq!(json["invocations"][0]["arguments"], 8);
    assert_eq!(json["config_sources"], serde_json::json!([{"origin": "builtin"}]));
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn test_never_captured_is_cache_miss() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let other = Fingerprint::new("something-else", TagSet::default());
    let err = replay::load(&db, &other).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_explain_plan() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("link.db");
    let command = build_command(&output_in(&dir), &[]);
    run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();

    let fingerprint = fingerprint_for(&command, None);
    let cached = replay::load(&db, &fingerprint).unwrap();
    let linker = PathBuf::from(fixtures::TOOL_DIR).join("link");
    let plan = ReplayPlan::build(&fingerprint, &linker, &cached).unwrap();

    assert_eq!(plan.args[1], replay::OUTPUT_PLACEHOLDER);
    assert_eq!(plan.args[3], replay::IMPORTCFG_PLACEHOLDER);
    assert_eq!(plan.args.last().map(String::as_str), Some("/home/dev/.cache/go-build/3c/3c1f-d"));
    assert_eq!(plan.manifest.len(), 4);
    assert!(plan.to_human().contains("Entry:     example.com/hello"));
}

#[cfg(unix)]
mod linker {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_LINKER: &str = r#"#!/bin/sh
out=""
cfg=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -importcfg) cfg="$2"; shift ;;
  esac
  shift
done
cp "$cfg" "$out.importcfg"
printf '#!/bin/sh\necho hello\n' > "$out"
chmod +x "$out"
"#;

    const FAILING_LINKER: &str = "#!/bin/sh\necho 'link: running gcc failed' >&2\nexit 3\n";

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn captured(dir: &TempDir) -> (PathBuf, Fingerprint) {
        let db = dir.path().join("link.db");
        let command = build_command(&output_in(dir), &[]);
        run_capture(&ScriptedDriver::new(vec![warm_trace()]), &command, &options(&db)).unwrap();
        (db, fingerprint_for(&command, None))
    }

    #[test]
    fn test_relink_produces_binary() {
        let dir = TempDir::new().unwrap();
        let (db, fingerprint) = captured(&dir);
        let linker = script(&dir, "link", FAKE_LINKER);

        let binary = replay::relink(&db, &fingerprint, &linker).unwrap();
        assert!(binary.exists());

        let manifest_copy = PathBuf::from(format!("{}.importcfg", binary.display()));
        let manifest = fs::read_to_string(&manifest_copy).unwrap();
        let mut lines: Vec<&str> = manifest.lines().collect();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "modinfo \"0w\\xaf\\f\\x92t\\b\\x02A\\x10path\\texample.com/hello\\n\"",
                "packagefile example.com/hello=/home/dev/.cache/go-build/3c/3c1f-d",
                "packagefile fmt=/home/dev/.cache/go-build/8a/8a2e-d",
                "packagefile runtime=/home/dev/.cache/go-build/51/51aa-d",
            ]
        );

        fs::remove_file(&binary).unwrap();
        fs::remove_file(&manifest_copy).unwrap();
    }

    #[test]
    fn test_linker_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let (db, fingerprint) = captured(&dir);
        let linker = script(&dir, "link", FAILING_LINKER);

        let err = replay::relink(&db, &fingerprint, &linker).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.child_output(), Some("link: running gcc failed\n"));
    }
}
