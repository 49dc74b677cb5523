use std::{fs, io::IsTerminal};

use eyre::WrapErr;
use paths::{
    AssumeExists, MappingRule, OsFamily, PathError, PathMapper, PlatformProfile,
    infer_client_os,
};
use rstest::rstest;
use tracing_subscriber::EnvFilter;

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

fn path_str(path: &std::path::Path) -> eyre::Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| eyre::eyre!("non utf-8 path {}", path.display()))
}

#[test]
fn round_trip_within_mapped_root() -> eyre::Result<()> {
    let local = tempfile::tempdir().wrap_err("creating local dir")?;
    fs::create_dir_all(local.path().join("pkg")).wrap_err("creating package dir")?;
    fs::write(local.path().join("pkg").join("mod.py"), "x = 1\n").wrap_err("writing source")?;

    let local_root = path_str(local.path())?;
    let mapper = PathMapper::new(
        vec![MappingRule::new(&local_root, "/remote/dir")],
        PlatformProfile::POSIX,
        None,
    );

    let local_file = path_str(&local.path().join("pkg").join("mod.py"))?;
    let remote = mapper.to_remote(&local_file);
    assert_eq!(remote, "/remote/dir/pkg/mod.py");
    assert_eq!(mapper.to_local(&remote)?, local_file);
    Ok(())
}

#[test]
fn missing_local_file_is_a_miss() -> eyre::Result<()> {
    let local = tempfile::tempdir().wrap_err("creating local dir")?;
    let local_root = path_str(local.path())?;
    let mapper = PathMapper::new(
        vec![MappingRule::new(&local_root, "/remote/dir")],
        PlatformProfile::POSIX,
        None,
    );

    match mapper.to_local("/remote/dir/gone.py") {
        Err(PathError::LocalMiss { remote, candidate }) => {
            assert_eq!(remote, "/remote/dir/gone.py");
            assert_eq!(candidate, format!("{local_root}/gone.py"));
        }
        other => eyre::bail!("expected a local miss, got {other:?}"),
    }
    Ok(())
}

#[rstest]
#[case("c:\\temp\\src\\a.py", "/remote/dir/a.py")]
#[case("C:\\TEMP\\src\\a.py", "/remote/dir/a.py")]
#[case("C:/Temp/Src/pkg/B.py", "/remote/dir/pkg/B.py")]
#[case("d:\\temp\\src\\a.py", "d:\\temp\\src\\a.py")]
#[case("C:\\TEMP\\srcs\\a.py", "C:\\TEMP\\srcs\\a.py")]
fn windows_client_paths(#[case] local: &str, #[case] expected: &str) {
    let rules = vec![MappingRule::new("C:\\TEMP\\src", "/remote/dir")];
    let os = infer_client_os(&rules, None);
    assert_eq!(os, OsFamily::Windows);

    let mapper = PathMapper::new(rules, os.profile(), None);
    assert_eq!(mapper.to_remote(local), expected);
}

#[test]
fn windows_client_reverse_mapping() {
    let mapper = PathMapper::new(
        vec![MappingRule::new("C:\\TEMP\\src", "/remote/dir")],
        PlatformProfile::WINDOWS,
        None,
    )
    .with_probe(AssumeExists);

    assert_eq!(
        mapper.to_local("/remote/dir/code.py"),
        Ok("C:\\TEMP\\src\\code.py".to_string())
    );
    // the remote side is case-sensitive
    assert!(matches!(
        mapper.to_local("/Remote/dir/code.py"),
        Err(PathError::UnmappedPath { .. })
    ));
}

#[rstest]
#[case(Some("/remote/cwd"), "/remote/cwd/x.py")]
#[case(Some("C:\\work"), "C:\\work\\x.py")]
#[case(None, "x.py")]
fn dot_remote_root(#[case] cwd: Option<&str>, #[case] expected: &str) {
    let mapper = PathMapper::new(
        vec![MappingRule::new("/local/dir", ".")],
        PlatformProfile::POSIX,
        cwd.map(str::to_string),
    );
    assert_eq!(mapper.to_remote("/local/dir/x.py"), expected);
}

#[test]
fn dot_remote_root_reverse() {
    let mapper = PathMapper::new(
        vec![MappingRule::new("/local/dir", ".")],
        PlatformProfile::POSIX,
        Some("/remote/cwd".to_string()),
    )
    .with_probe(AssumeExists);
    assert_eq!(
        mapper.to_local("/remote/cwd/sub/x.py"),
        Ok("/local/dir/sub/x.py".to_string())
    );
}

#[rstest]
#[case("/a/bc/x.py", "/remote/x.py")]
#[case("/a/bcd/x.py", "/a/bcd/x.py")]
#[case("/a/b/x.py", "/a/b/x.py")]
#[case("/a/bc", "/remote")]
fn segment_boundaries(#[case] local: &str, #[case] expected: &str) {
    let mapper = PathMapper::new(
        vec![MappingRule::new("/a/bc", "/remote")],
        PlatformProfile::POSIX,
        None,
    );
    assert_eq!(mapper.to_remote(local), expected);
}

#[test]
fn overlapping_rules_use_configuration_order() {
    let rules = vec![
        MappingRule::new("/work", "/srv/work"),
        MappingRule::new("/work/vendor", "/opt/vendor"),
    ];
    let mapper = PathMapper::new(rules, PlatformProfile::POSIX, None);
    assert_eq!(
        mapper.to_remote("/work/vendor/lib.py"),
        "/srv/work/vendor/lib.py"
    );
}

#[rstest]
#[case(Some("INVALID"), OsFamily::Windows)]
#[case(Some(""), OsFamily::Windows)]
#[case(None, OsFamily::Windows)]
#[case(Some("unix"), OsFamily::Linux)]
#[case(Some(" WINDOWS "), OsFamily::Windows)]
fn client_os_override(#[case] explicit: Option<&str>, #[case] expected: OsFamily) {
    let rules = vec![MappingRule::new("C:\\TEMP\\src", "/remote/dir")];
    assert_eq!(infer_client_os(&rules, explicit), expected);
}

#[test]
fn posix_first_rule_means_linux() {
    let rules = vec![MappingRule::new("/home/me/project", "/app")];
    assert_eq!(infer_client_os(&rules, Some("INVALID")), OsFamily::Linux);
}

#[test]
fn rules_deserialize_from_launch_arguments() -> eyre::Result<()> {
    let rules: Vec<MappingRule> = serde_json::from_str(
        r#"[{"localRoot": "C:\\TEMP\\src", "remoteRoot": "/remote/dir"}, {"localRoot": "/tmp", "remoteRoot": "."}]"#,
    )
    .wrap_err("parsing rules")?;
    assert_eq!(rules[0], MappingRule::new("C:\\TEMP\\src", "/remote/dir"));
    assert!(rules[1].is_cwd_anchored());
    Ok(())
}
