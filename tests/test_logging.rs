use insights::logging::{self, LOG_FILE_NAME};

#[test]
fn test_logging_to_directory() -> anyhow::Result<()> {
    let test_dir = tempfile::tempdir()?;
    let log_dir = test_dir.path().join("logs");

    logging::init_logging(Some(&log_dir), "report")?;

    tracing::info!("Test info message");
    tracing::warn!(region = "Scotland", "Test warning message");

    let contents = std::fs::read_to_string(log_dir.join(LOG_FILE_NAME))?;
    assert!(contents.contains("New report run"));
    assert!(contents.contains(&"=".repeat(80)));
    assert!(contents.contains("Test info message"));
    assert!(contents.contains("Test warning message"));

    // Second init keeps the first subscriber and appends a new separator
    logging::init_logging(Some(&log_dir), "import")?;
    let contents = std::fs::read_to_string(log_dir.join(LOG_FILE_NAME))?;
    assert!(contents.contains("New import run"));

    Ok(())
}
