use std::{collections::HashSet, fs, io::IsTerminal, sync::Arc, time::Duration};

use eyre::WrapErr;
use paths::{MappingRule, OsFamily};
use rstest::rstest;
use serde_json::json;
use session::{
    DebuggeeConnection, ProbeMode, SessionConfig, SessionContext, SourceError,
    testing::{FakeDebuggee, backchannel},
};
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

const CALL_ME_BACK: &str = "def call_me_back(callback):\n    callback()\n";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocation_of_one_path() -> eyre::Result<()> {
    let context = Arc::new(SessionContext::new());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let context = Arc::clone(&context);
            tokio::spawn(async move { context.registry().allocate("/usr/lib/shared.py") })
        })
        .collect();

    let mut references = HashSet::new();
    for handle in handles {
        references.insert(handle.await.wrap_err("allocating task panicked")?);
    }
    assert_eq!(references.len(), 1);
    assert_eq!(context.registry().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocation_of_distinct_paths() -> eyre::Result<()> {
    let context = Arc::new(SessionContext::new());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let context = Arc::clone(&context);
            tokio::spawn(async move { context.registry().allocate(&format!("/lib/{i}.py")) })
        })
        .collect();

    let mut references = HashSet::new();
    for handle in handles {
        references.insert(handle.await.wrap_err("allocating task panicked")?);
    }
    assert_eq!(references, (1..=50).collect::<HashSet<_>>());
    Ok(())
}

#[tokio::test]
async fn mapped_session_on_shared_filesystem() -> eyre::Result<()> {
    let local = tempfile::tempdir().wrap_err("creating local dir")?;
    fs::write(local.path().join("code.py"), "print('hi')\n").wrap_err("writing code.py")?;
    let local_root = local
        .path()
        .to_str()
        .ok_or_else(|| eyre::eyre!("non utf-8 temp dir"))?
        .to_string();
    let local_code = format!("{local_root}/code.py");

    let debuggee = Arc::new(
        FakeDebuggee::new()
            .with_file("/remote/dir/code.py", "print('hi')\n")
            .with_file("/remote/lib/call_me_back.py", CALL_ME_BACK),
    );
    let context = SessionContext::new();
    context
        .configure(
            SessionConfig {
                path_mappings: vec![MappingRule::new(&local_root, "/remote/dir")],
                ..Default::default()
            },
            ProbeMode::Host,
            debuggee.as_ref(),
        )
        .wrap_err("configuring session")?;

    let installed = context
        .breakpoints()
        .install(debuggee.as_ref(), &local_code, &[1])
        .await?;
    assert_eq!(
        debuggee.breakpoints(),
        vec![("/remote/dir/code.py".to_string(), vec![1])]
    );
    assert_eq!(installed[0].path, local_code);
    assert!(installed[0].verified);

    debuggee.set_stack(vec![
        "/remote/dir/code.py".to_string(),
        "/remote/lib/call_me_back.py".to_string(),
    ]);
    let sources: Vec<_> = debuggee
        .stack()
        .iter()
        .map(|path| context.frames().resolve(path))
        .collect();
    assert_eq!(sources[0].display_path, local_code);
    assert_eq!(sources[0].source_reference, 0);
    assert_eq!(sources[1].display_path, "/remote/lib/call_me_back.py");
    assert!(sources[1].source_reference > 0);

    // later stops reuse the reference
    let again = context.frames().resolve("/remote/lib/call_me_back.py");
    assert_eq!(again.source_reference, sources[1].source_reference);

    let content = context.content(debuggee.clone());
    let err = content
        .fetch(0)
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("reference 0 served content"))?;
    assert_eq!(err.to_string(), "Source unavailable");

    let text = content.fetch(sources[1].source_reference).await?;
    assert!(text.contains("def call_me_back(callback):"));
    Ok(())
}

#[tokio::test]
async fn windows_client_inferred_from_mappings() -> eyre::Result<()> {
    let (harness, debuggee_end) = backchannel();
    let debuggee = Arc::new(
        FakeDebuggee::new()
            .with_file("/remote/dir/code.py", "print('hi')\n")
            .with_backchannel(debuggee_end),
    );

    let config = SessionConfig::from_arguments(&json!({
        "pathMappings": [{"localRoot": "C:\\TEMP\\src", "remoteRoot": "/remote/dir"}],
        "debugOptions": ["CLIENT_OS_TYPE=INVALID"],
    }))?;
    let context = SessionContext::new();
    let os = context.configure(config, ProbeMode::Auto, debuggee.as_ref())?;
    assert_eq!(os, OsFamily::Windows);

    let message = harness.receive().await?;
    assert_eq!(message, json!({"ide_os": "WINDOWS"}));
    assert_eq!(debuggee.client_os(), Some(OsFamily::Windows));

    context
        .breakpoints()
        .install(debuggee.as_ref(), "c:\\temp\\SRC\\code.py", &[1])
        .await?;
    assert_eq!(debuggee.breakpoints()[0].0, "/remote/dir/code.py");

    let source = context.frames().resolve("/remote/dir/code.py");
    assert_eq!(source.display_path, "C:\\TEMP\\src\\code.py");
    assert_eq!(source.source_reference, 0);
    Ok(())
}

#[rstest]
#[case::remote_cwd(Some("/remote/cwd"), "/remote/cwd/x.py")]
#[case::nested_remote_cwd(Some("/srv/app/"), "/srv/app/x.py")]
#[case::no_cwd(None, "x.py")]
#[tokio::test]
async fn dot_remote_root_follows_remote_cwd(
    #[case] cwd: Option<&str>,
    #[case] expected: &str,
) -> eyre::Result<()> {
    let debuggee = FakeDebuggee::new();
    let mut arguments = json!({
        "pathMappings": [{"localRoot": "/local/dir", "remoteRoot": "."}],
    });
    if let Some(cwd) = cwd {
        arguments["cwd"] = json!(cwd);
    }
    let context = SessionContext::new();
    context.configure(
        SessionConfig::from_arguments(&arguments)?,
        ProbeMode::Assume,
        &debuggee,
    )?;

    assert_eq!(context.mapper().to_remote("/local/dir/x.py"), expected);
    Ok(())
}

#[tokio::test]
async fn teardown_cancels_outstanding_fetch() -> eyre::Result<()> {
    let debuggee = Arc::new(FakeDebuggee::new().with_file("/lib/slow.py", "pass\n"));
    debuggee.hold_reads();

    let context = SessionContext::new();
    let reference = context.registry().allocate("/lib/slow.py");
    let connection: Arc<dyn DebuggeeConnection> = debuggee.clone();
    let content = context.content(connection);

    let fetch = tokio::spawn(async move { content.fetch(reference).await });
    while debuggee.reads() == 0 {
        tokio::task::yield_now().await;
    }
    context.teardown();

    let result = tokio::time::timeout(Duration::from_secs(1), fetch)
        .await
        .wrap_err("fetch did not finish after teardown")?
        .wrap_err("fetch task panicked")?;
    match result {
        Err(e @ SourceError::Cancelled { .. }) => assert_eq!(e.to_string(), "Source unavailable"),
        other => eyre::bail!("expected cancellation, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fetch_gives_up_after_timeout() -> eyre::Result<()> {
    let debuggee = Arc::new(FakeDebuggee::new().with_file("/lib/slow.py", "pass\n"));
    debuggee.hold_reads();

    let context = SessionContext::new();
    let reference = context.registry().allocate("/lib/slow.py");
    let content = context
        .content(debuggee.clone())
        .with_timeout(Duration::from_secs(2));

    match content.fetch(reference).await {
        Err(SourceError::TimedOut { after, .. }) => assert_eq!(after, Duration::from_secs(2)),
        other => eyre::bail!("expected a timeout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn references_from_earlier_session_are_stale() -> eyre::Result<()> {
    let debuggee = Arc::new(FakeDebuggee::new().with_file("/lib/a.py", "a = 1\n"));

    let first = SessionContext::new();
    let old = first.registry().allocate("/lib/a.py");
    let floor = first.teardown();

    let second = SessionContext::with_reference_floor(floor);
    let content = second.content(debuggee.clone());
    match content.fetch(old).await {
        Err(e @ SourceError::StaleHandle { .. }) => assert_eq!(e.to_string(), "Source unavailable"),
        other => eyre::bail!("expected a stale handle, got {other:?}"),
    }

    let new = second.registry().allocate("/lib/a.py");
    assert!(new > old);
    assert_eq!(content.fetch(new).await?, "a = 1\n");
    Ok(())
}
