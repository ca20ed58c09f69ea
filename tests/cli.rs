use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_harvest_cli_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn class_harvest() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_class-harvest"));
    cmd.env_remove("CLASS_HARVEST_WHITELIST").env_remove("RUST_LOG");
    cmd
}

fn run_json(cmd: &mut Command) -> anyhow::Result<serde_json::Value> {
    let output = cmd.output()?;
    anyhow::ensure!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn whitelist_commands_persist_to_the_given_file() -> anyhow::Result<()> {
    let base = temp_dir("whitelist");
    std::fs::create_dir_all(&base)?;
    let file = base.join("wl.txt");

    let listed = run_json(class_harvest().arg("--whitelist").arg(&file).args(["whitelist", "list"]))?;
    let defaults = listed.as_array().map(Vec::len).unwrap_or(0);
    assert!(defaults > 0);
    assert!(listed.as_array().unwrap().iter().any(|p| p == "spring-"));

    run_json(class_harvest().arg("--whitelist").arg(&file).args(["whitelist", "clear"]))?;
    let added = run_json(
        class_harvest()
            .args(["whitelist", "add", "Acme-Vendor", "  "])
            .arg("--whitelist")
            .arg(&file),
    )?;
    assert_eq!(added["changed"], 1);
    assert_eq!(added["patterns"], 1);

    let content = std::fs::read_to_string(&file)?;
    assert!(content.lines().any(|l| l == "acme-vendor"));

    let listed = run_json(class_harvest().arg("--whitelist").arg(&file).args(["whitelist", "list"]))?;
    assert_eq!(listed, serde_json::json!(["acme-vendor"]));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn unpack_reports_extraction_as_json() -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    let base = temp_dir("unpack");
    std::fs::create_dir_all(&base)?;
    let mut zip = zip::ZipWriter::new(std::fs::File::create(base.join("app.jar"))?);
    zip.start_file("com/acme/App.class", FileOptions::default())?;
    zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE])?;
    zip.finish()?;

    let file = base.join("wl.txt");
    std::fs::write(&file, "# test\nspring-\n")?;

    let report = run_json(
        class_harvest()
            .arg("--whitelist")
            .arg(&file)
            .arg("unpack")
            .arg(&base),
    )?;
    assert_eq!(report["extracted"], serde_json::json!(["app.jar"]));
    assert_eq!(report["class_files_found"], 1);
    assert!(base.join("app/com/acme/App.class").is_file());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
