use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docvault_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docvault");
    path
}

/// Minimal valid PDF containing the text "vault test phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 45 >> stream\nBT /F1 12 Tf 100 700 Td (vault test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("manual.pdf"), minimal_pdf_with_phrase()).unwrap();
    fs::write(files_dir.join("notes.docx"), b"not really a docx").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/db/docvault.sqlite"

[storage]
data_dir = "{root}/data"

[chunking]
chunk_size = 500
chunk_overlap = 50

[logging]
filter = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docvault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docvault(config_path: &Path, user: &str, args: &[&str]) -> (String, String, bool) {
    let binary = docvault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--user")
        .arg(user)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docvault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// The id printed in parentheses on the first line containing `marker`.
fn id_after(stdout: &str, marker: &str) -> String {
    let line = stdout
        .lines()
        .find(|l| l.contains(marker))
        .unwrap_or_else(|| panic!("no line with {:?} in:\n{}", marker, stdout));
    let start = line.rfind('(').unwrap() + 1;
    let end = line.rfind(')').unwrap();
    line[start..end].to_string()
}

fn init_with_app(config: &Path) -> String {
    let (_, stderr, ok) = run_docvault(config, "alice", &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (stdout, stderr, ok) = run_docvault(config, "alice", &["app", "create", "TEST"]);
    assert!(ok, "app create failed: {}", stderr);
    id_after(&stdout, "Created app TEST")
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();
    for _ in 0..2 {
        let (stdout, stderr, ok) = run_docvault(&config, "alice", &["init"]);
        assert!(ok, "init failed: {}", stderr);
        assert!(stdout.contains("Database initialized successfully."));
    }
    assert!(tmp.path().join("db/docvault.sqlite").exists());
    assert!(tmp.path().join("data").is_dir());
}

#[test]
fn test_invalid_app_name_reports_kind() {
    let (_tmp, config) = setup_test_env();
    run_docvault(&config, "alice", &["init"]);
    let (_, stderr, ok) = run_docvault(&config, "alice", &["app", "create", "abcd"]);
    assert!(!ok);
    assert!(stderr.contains("error [INVALID_INPUT]"), "stderr: {}", stderr);
}

#[test]
fn test_pdf_chunk_lifecycle() {
    let (tmp, config) = setup_test_env();
    let app_id = init_with_app(&config);
    let pdf = tmp.path().join("files/manual.pdf");

    let (stdout, stderr, ok) = run_docvault(&config, "alice", &["doc", "upload", &app_id, pdf.to_str().unwrap()]);
    assert!(ok, "upload failed: {}", stderr);
    let doc_id = id_after(&stdout, "Uploaded manual.pdf");

    let (stdout, stderr, ok) = run_docvault(&config, "alice", &["chunk", "create", &doc_id]);
    assert!(ok, "chunk create failed: {}", stderr);
    assert!(stdout.contains("Created 1 chunks"), "stdout: {}", stdout);
    assert!(stdout.contains("vault test phrase"));

    let (stdout, _, ok) = run_docvault(&config, "alice", &["chunk", "list", &doc_id]);
    assert!(ok);
    assert_eq!(stdout.lines().count(), 1);

    let (_, stderr, ok) = run_docvault(&config, "mallory", &["chunk", "delete", &doc_id]);
    assert!(!ok);
    assert!(stderr.contains("error [FORBIDDEN]"), "stderr: {}", stderr);

    let (stdout, stderr, ok) = run_docvault(&config, "alice", &["chunk", "delete", &doc_id]);
    assert!(ok, "chunk delete failed: {}", stderr);
    assert!(stdout.contains("Deleted 1 chunks and 0 images"));

    let (stdout, _, ok) = run_docvault(&config, "alice", &["chunk", "list", &doc_id]);
    assert!(ok);
    assert!(stdout.trim().is_empty());
}

#[test]
fn test_docx_is_unsupported_and_app_batch_is_partial() {
    let (tmp, config) = setup_test_env();
    let app_id = init_with_app(&config);
    let pdf = tmp.path().join("files/manual.pdf");
    let docx = tmp.path().join("files/notes.docx");

    let (stdout, stderr, ok) = run_docvault(
        &config,
        "alice",
        &["doc", "upload", &app_id, pdf.to_str().unwrap(), docx.to_str().unwrap()],
    );
    assert!(ok, "upload failed: {}", stderr);
    let docx_id = id_after(&stdout, "Uploaded notes.docx");

    let (_, stderr, ok) = run_docvault(&config, "alice", &["chunk", "create", &docx_id]);
    assert!(!ok);
    assert!(stderr.contains("error [UNSUPPORTED_TYPE]"), "stderr: {}", stderr);

    let (stdout, stderr, ok) = run_docvault(&config, "alice", &["chunk", "create", "--app", &app_id]);
    assert!(!ok);
    assert!(stdout.contains("Created 1 chunks"), "stdout: {}", stdout);
    assert!(stdout.contains("[UNSUPPORTED_TYPE]"));
    assert!(stderr.contains("error [PARTIAL_BATCH_FAILURE]"), "stderr: {}", stderr);
}

#[test]
fn test_app_delete_cascades() {
    let (tmp, config) = setup_test_env();
    let app_id = init_with_app(&config);
    let pdf = tmp.path().join("files/manual.pdf");

    let (stdout, _, ok) = run_docvault(&config, "alice", &["doc", "upload", &app_id, pdf.to_str().unwrap()]);
    assert!(ok);
    let doc_id = id_after(&stdout, "Uploaded manual.pdf");
    let (_, _, ok) = run_docvault(&config, "alice", &["chunk", "create", &doc_id]);
    assert!(ok);

    let (_, stderr, ok) = run_docvault(&config, "bob", &["app", "delete", &app_id]);
    assert!(!ok);
    assert!(stderr.contains("error [FORBIDDEN]"));

    let (stdout, stderr, ok) = run_docvault(&config, "alice", &["app", "delete", &app_id]);
    assert!(ok, "app delete failed: {}", stderr);
    assert!(stdout.contains("Deleted app TEST (1 documents"));
    assert!(!tmp.path().join("data/TEST").exists());

    let (_, stderr, ok) = run_docvault(&config, "alice", &["app", "show", &app_id]);
    assert!(!ok);
    assert!(stderr.contains("error [NOT_FOUND]"));
}
