use std::{collections::HashSet, path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_poll_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin("poll-service");
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("poll.log");

    let (mut server, mut server_stdout) = spawn_server(&binary, &log_path).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Keep reading server output so its stdout pipe never fills.
    let server_log_task =
        tokio::spawn(async move { io::copy(&mut server_stdout, &mut io::sink()).await });

    let tally = run_client(&binary, &addr, &["show"]).await?;
    assert_eq!(
        tally.lines().collect::<HashSet<_>>(),
        HashSet::from(["red has 0 vote(s)", "blue has 0 vote(s)"])
    );

    let vote = run_client(&binary, &addr, &["vote", "red"]).await?;
    assert_eq!(vote.trim_end(), "red now has 1 vote(s)");

    let rejected = run_client(&binary, &addr, &["vote", "green"]).await?;
    assert_eq!(
        rejected.trim_end(),
        "ERROR: The choice green is not an option in the poll"
    );

    let tally = run_client(&binary, &addr, &["show"]).await?;
    assert_eq!(
        tally.lines().collect::<HashSet<_>>(),
        HashSet::from(["red has 1 vote(s)", "blue has 0 vote(s)"])
    );

    // Server keeps running after clients disconnect; terminate it manually.
    let _ = server.kill().await;
    let _ = server.wait().await;
    let _ = server_log_task.await;

    let log = std::fs::read_to_string(&log_path).context("read audit log")?;
    let requests: Vec<&str> = log
        .lines()
        .map(|line| line.rsplit(" : ").next().unwrap_or_default())
        .collect();
    assert_eq!(requests, ["show", "vote red", "vote green", "show"]);

    Ok(())
}

#[tokio::test]
async fn server_rejects_too_few_options() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin("poll-service");
    let output = Command::new(&binary)
        .args(["server", "--listen", "127.0.0.1:0", "red"])
        .stdout(Stdio::null())
        .output()
        .await?;

    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
    Ok(())
}

#[tokio::test]
async fn server_rejects_duplicate_options() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin("poll-service");
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("poll.log");
    let output = Command::new(&binary)
        .arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--log-file")
        .arg(&log_path)
        .args(["red", "red"])
        .env("NO_COLOR", "1")
        .output()
        .await?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("invalid poll options"),
        "unexpected stderr: {stderr}"
    );
    Ok(())
}

#[tokio::test]
async fn client_needs_an_option_to_vote() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin("poll-service");
    let output = Command::new(&binary)
        .args(["client", "vote"])
        .output()
        .await?;

    assert!(!output.status.success());
    Ok(())
}

async fn spawn_server(binary: &Path, log_path: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--log-file")
        .arg(log_path)
        .args(["red", "blue"])
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut banner = String::new();
    let read = timeout(READ_TIMEOUT, reader.read_line(&mut banner))
        .await
        .map_err(|_| anyhow!("timed out waiting for the server banner"))??;
    if read == 0 {
        return Err(anyhow!("server exited before printing its address"));
    }
    let trimmed = banner.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected server banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("server banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn run_client(binary: &Path, addr: &str, request: &[&str]) -> Result<String> {
    let output = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .arg("client")
            .arg("--server")
            .arg(addr)
            .args(request)
            .env("RUST_LOG", "warn")
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .output(),
    )
    .await
    .map_err(|_| anyhow!("client {request:?} timed out"))?
    .with_context(|| format!("failed to run client {request:?}"))?;

    if !output.status.success() {
        return Err(anyhow!(
            "client {request:?} exited with status {}",
            output.status
        ));
    }
    String::from_utf8(output.stdout).context("client output was not UTF-8")
}
