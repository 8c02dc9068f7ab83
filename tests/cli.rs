//! Integration tests that drive the built `docket` binary end to end:
//! init → register → process → status → search, over a born-digital PDF
//! assembled by hand so no external OCR tooling is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docket_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docket");
    path
}

/// Minimal valid single-page PDF whose embedded text comfortably exceeds
/// the born-digital threshold. Body is built first, then an xref table with
/// correct byte offsets so the text layer parses cleanly.
fn born_digital_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 50 760 Td ");
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            content.push_str("0 -16 Td ");
        }
        content.push_str(&format!("({}) Tj ", line));
    }
    content.push_str("ET");

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n", content.len(), content)
            .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
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

fn ruling_pdf() -> Vec<u8> {
    born_digital_pdf(&[
        "Before the tax appeals tribunal sitting at the main registry the",
        "appellant challenged the customs excise assessment raised by the",
        "commissioner following a post clearance audit of imported goods.",
        "The tribunal considered the valuation method applied to the goods",
        "and the documentary evidence produced by both parties at hearing.",
        "Having weighed the submissions the tribunal finds the assessment",
        "was raised without a lawful basis and the appeal is hereby allowed",
        "with costs to the appellant as provided under the governing statute.",
    ])
}

fn setup_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("ruling.pdf"), ruling_pdf()).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/docket.sqlite"

[extraction]
min_embedded_chars = 300

[embedding]
provider = "hash"
dims = 128
"#,
        root.display()
    );
    let config_path = root.join("docket.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, files_dir)
}

fn run_docket(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docket_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docket binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Pull the document id out of `register` output.
fn registered_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|line| {
            let trimmed = line.trim_start();
            trimmed
                .split_whitespace()
                .next()
                .filter(|token| token.len() == 36 && token.chars().filter(|c| *c == '-').count() == 4)
                .map(|token| token.to_string())
        })
        .expect("register output should contain a document id")
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path, _files) = setup_env();

    let (stdout, stderr, ok) = run_docket(&config_path, &["init"]);
    assert!(ok, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, ok) = run_docket(&config_path, &["init"]);
    assert!(ok, "second init failed (not idempotent)");
}

#[test]
fn full_pipeline_from_register_to_search() {
    let (_tmp, config_path, files_dir) = setup_env();

    run_docket(&config_path, &["init"]);

    let pdf = files_dir.join("ruling.pdf");
    let (stdout, stderr, ok) = run_docket(
        &config_path,
        &["register", pdf.to_str().unwrap(), "--case", "case-17"],
    );
    assert!(ok, "register failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("newly registered: 1"));
    let doc_id = registered_id(&stdout);

    let (stdout, stderr, ok) = run_docket(&config_path, &["process"]);
    assert!(ok, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("completed"), "unexpected process output: {}", stdout);
    assert!(stdout.contains("1 completed, 0 failed"), "unexpected queue stats: {}", stdout);

    let (stdout, stderr, ok) = run_docket(&config_path, &["status", &doc_id]);
    assert!(ok, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status: completed"));
    assert!(stdout.contains("pages: 1"));
    assert!(stdout.contains("processed pages: 1"));

    for mode in ["lexical", "semantic", "hybrid"] {
        let (stdout, stderr, ok) = run_docket(
            &config_path,
            &["search", "customs excise", "--mode", mode],
        );
        assert!(ok, "search --mode {} failed: stdout={}, stderr={}", mode, stdout, stderr);
        assert!(
            stdout.contains("p.1"),
            "search --mode {} returned no page citation: {}",
            mode,
            stdout
        );
    }

    // The lexical snippet must carry a query term.
    let (stdout, _, _) = run_docket(
        &config_path,
        &["search", "customs excise", "--mode", "lexical"],
    );
    let lowered = stdout.to_lowercase();
    assert!(lowered.contains("customs") || lowered.contains("excise"));
}

#[test]
fn reregistering_is_a_noop_and_reprocess_runs() {
    let (_tmp, config_path, files_dir) = setup_env();

    run_docket(&config_path, &["init"]);
    let pdf = files_dir.join("ruling.pdf");
    let (stdout, _, _) = run_docket(
        &config_path,
        &["register", pdf.to_str().unwrap(), "--case", "case-17"],
    );
    let doc_id = registered_id(&stdout);

    let (stdout, _, ok) = run_docket(
        &config_path,
        &["register", pdf.to_str().unwrap(), "--case", "case-17"],
    );
    assert!(ok);
    assert!(stdout.contains("newly registered: 0"));

    run_docket(&config_path, &["process"]);

    let (stdout, stderr, ok) = run_docket(&config_path, &["reprocess", &doc_id]);
    assert!(ok, "reprocess failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("completed"), "unexpected reprocess output: {}", stdout);

    let (stdout, _, _) = run_docket(&config_path, &["status", &doc_id]);
    assert!(stdout.contains("status: completed"));
    assert!(stdout.contains("pages: 1"));
}

#[test]
fn unknown_document_status_is_reported() {
    let (_tmp, config_path, _files) = setup_env();
    run_docket(&config_path, &["init"]);

    let (stdout, _, ok) = run_docket(&config_path, &["status", "not-a-real-id"]);
    assert!(ok);
    assert!(stdout.contains("not found"));
}
