//! End-to-end archive ingestion through the public library API.

use std::io::{Cursor, Write};
use std::sync::Arc;

use code_proof::config::Config;
use code_proof::context::build_context;
use code_proof::error::Error;
use code_proof::models::{Reference, SkipReason};
use code_proof::resolve::resolve_reference;
use code_proof::search::search_corpus;
use code_proof::session::{Session, SourceSpec};
use code_proof::store::InMemoryHistory;
use code_proof::tree::{build_tree, render_tree};
use zip::write::SimpleFileOptions;

fn build_zip(entries: &[(&str, &[u8])]) -> Arc<[u8]> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner().into()
}

fn session_with(config: Config) -> Session {
    let history = Arc::new(InMemoryHistory::new(config.store.max_history));
    Session::new(Arc::new(config), history).unwrap()
}

fn archive(name: &str, bytes: Arc<[u8]>) -> SourceSpec {
    SourceSpec::Archive {
        name: name.to_string(),
        bytes,
    }
}

#[tokio::test]
async fn test_archive_is_filtered_and_normalized() {
    let bytes = build_zip(&[
        ("proj/a.py", b"print('a')\n"),
        ("proj/lib/b.py", b"def b():\n    return 2\n"),
        ("proj/node_modules/x/index.js", b"module.exports = 1"),
        ("proj/logo.png", b"\x89PNG"),
        ("proj/data.bin.js", &[0xff, 0xfe, 0xfd]),
    ]);

    let session = session_with(Config::default());
    let ingestion = session.ingest(archive("proj.zip", bytes)).await.unwrap();

    let paths: Vec<&str> = ingestion.corpus.paths().collect();
    assert_eq!(paths, vec!["a.py", "lib/b.py"]);
    assert_eq!(ingestion.source_label, "proj.zip");
    assert!(ingestion.repo.is_none());
    assert_eq!(ingestion.skipped.len(), 1);
    assert_eq!(ingestion.skipped[0].path, "proj/data.bin.js");
    assert_eq!(ingestion.skipped[0].reason, SkipReason::NotText);
}

#[tokio::test]
async fn test_archive_feeds_every_consumer() {
    let bytes = build_zip(&[
        ("app/src/auth.js", b"import jwt from 'jwt'\n\nexport function login() {\n  return jwt.sign()\n}\n"),
        ("app/src/db.js", b"export const pool = connect()\n"),
        ("app/README.md", b"# App\nLogin docs\n"),
    ]);
    let session = session_with(Config::default());
    session.ingest(archive("app.zip", bytes)).await.unwrap();
    let ingestion = session.require().unwrap();
    let corpus = &ingestion.corpus;

    let context = build_context(corpus, 40_000);
    assert!(context.starts_with("\n\n### FILE: src/auth.js (6 lines)\n"));
    assert!(context.contains("### FILE: README.md (3 lines)"));

    let hits = search_corpus(corpus, "LOGIN");
    let found: Vec<(&str, usize)> = hits
        .iter()
        .flat_map(|h| h.matches.iter().map(move |m| (h.path.as_str(), m.line_number)))
        .collect();
    assert_eq!(found, vec![("src/auth.js", 3), ("README.md", 2)]);

    let resolved = resolve_reference(
        corpus,
        Reference {
            file: "src/auth.js".to_string(),
            start_line: Some(3),
            end_line: Some(4),
            snippet: None,
            explanation: None,
        },
    );
    assert_eq!(
        resolved.lines.unwrap(),
        vec!["export function login() {", "  return jwt.sign()"]
    );

    let tree = render_tree(&build_tree(corpus.paths()));
    assert_eq!(tree, vec!["src/", "  auth.js", "  db.js", "README.md"]);
}

#[tokio::test]
async fn test_user_excludes_apply_after_classifier() {
    let mut config = Config::default();
    config.limits.exclude_globs = vec!["**/generated/**".to_string()];
    let bytes = build_zip(&[
        ("p/src/main.rs", b"fn main() {}"),
        ("p/src/generated/api.rs", b"// generated"),
    ]);

    let session = session_with(config);
    let ingestion = session.ingest(archive("p.zip", bytes)).await.unwrap();
    let paths: Vec<&str> = ingestion.corpus.paths().collect();
    assert_eq!(paths, vec!["main.rs"]);
}

#[tokio::test]
async fn test_failed_ingestion_keeps_current_corpus() {
    let session = session_with(Config::default());
    let good = build_zip(&[("ok/a.py", b"a = 1")]);
    session.ingest(archive("good.zip", good)).await.unwrap();

    let err = session
        .ingest(archive("bad.zip", Arc::from(&b"not a zip"[..])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive { .. }));

    let only_assets = build_zip(&[("x/logo.svg", b"<svg/>"), ("x/.git/HEAD", b"ref")]);
    let err = session
        .ingest(archive("assets.zip", only_assets))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { source_kind: "ZIP" }));

    assert_eq!(session.require().unwrap().source_label, "good.zip");
}

#[tokio::test]
async fn test_remote_source_with_invalid_url_fails_fast() {
    let session = session_with(Config::default());
    let err = session
        .ingest(SourceSpec::Remote {
            url: "https://gitlab.com/owner/repo".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidUrl { .. }));
    assert!(matches!(session.require(), Err(Error::NoCorpus)));
}
