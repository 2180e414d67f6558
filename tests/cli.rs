mod util;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use util::write_tsv;

fn base_cmd(db: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("catsearch"));
    cmd.arg("--db").arg(db).env("RUST_LOG", "warn");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().clone();
    serde_json::from_slice(&output.stdout).expect("valid json on stdout")
}

fn ingest(db: &Path, file: &Path, mode: &str) -> Value {
    json_stdout(base_cmd(db).args(["ingest", "--dataset", "anime-titles", "--mode", mode]).arg(file))
}

#[test]
fn ingest_then_cascading_search_and_lookups() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("catalog.db");
    let dump = write_tsv(
        dir.path(),
        "anime.tsv",
        &[
            "# aid\tlang\tkind\tofficial\ttitle\tsynonyms\ttags",
            "1\tja\tofficial\tt\tmononoke hime",
            "1\ten\tofficial\tt\tprincess mononoke\tmononoke\tghibli|fantasy",
            "2\tx-jat\tprimary\tt\tmononoke",
        ],
    );

    let outcome = ingest(&db, &dump, "replace");
    assert_eq!(outcome["inserted"], 3);
    assert_eq!(outcome["range"]["first_id"], 1);
    assert_eq!(outcome["range"]["last_id"], 3);

    let hits = json_stdout(base_cmd(&db).args([
        "search",
        "--dataset",
        "anime-titles",
        "--json",
        "mononoke",
    ]));
    let langs: Vec<_> = hits
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["index"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(langs, vec!["japanese", "english", "romaji"]);
    assert_eq!(hits[0]["language"], "ja");

    let limited = json_stdout(base_cmd(&db).args([
        "search",
        "--dataset",
        "anime-titles",
        "--language",
        "en",
        "--limit",
        "1",
        "--json",
        "princess",
    ]));
    assert_eq!(limited.as_array().unwrap().len(), 1);
    assert_eq!(limited[0]["natural_key"], "1");
    assert_eq!(limited[0]["tags"], serde_json::json!(["ghibli", "fantasy"]));

    let by_key = json_stdout(base_cmd(&db).args([
        "get",
        "--dataset",
        "anime-titles",
        "--key",
        "1",
        "--json",
    ]));
    assert_eq!(by_key.as_array().unwrap().len(), 2);
    assert_eq!(by_key[0]["id"], 2);

    base_cmd(&db)
        .args(["get", "--dataset", "anime-titles", "--id", "3"])
        .assert()
        .success()
        .stdout(contains("mononoke"));
}

#[test]
fn append_generations_and_sweep() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("catalog.db");
    let first = write_tsv(dir.path(), "a.tsv", &["1\ten\tofficial\tt\tperfect blue"]);
    let second = write_tsv(dir.path(), "b.tsv", &["2\ten\tofficial\tt\tmillennium actress"]);

    ingest(&db, &first, "append");
    let outcome = ingest(&db, &second, "append");
    assert_eq!(outcome["killed"], 1);

    let generations = json_stdout(base_cmd(&db).args([
        "generations",
        "--dataset",
        "anime-titles",
        "--json",
    ]));
    assert_eq!(generations.as_array().unwrap().len(), 2);
    assert_eq!(generations[0]["dead"], true);
    assert_eq!(generations[1]["dead"], false);

    let report = json_stdout(base_cmd(&db).args(["sweep", "--retention-secs", "0"]));
    assert_eq!(report["reclaimed_generations"], 1);
    assert_eq!(report["deleted_rows"], 1);

    base_cmd(&db)
        .args(["get", "--dataset", "anime-titles", "--id", "1"])
        .assert()
        .success()
        .stdout(contains("no matches"));
    let missing = json_stdout(base_cmd(&db).args([
        "get",
        "--dataset",
        "anime-titles",
        "--key",
        "1",
        "--json",
    ]));
    assert_eq!(missing, serde_json::json!([]));
}

#[test]
fn relations_and_sources_survive_ingest() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("catalog.db");
    let dump = write_tsv(
        dir.path(),
        "linked.tsv",
        &["7\ten\tofficial\tt\tpaprika\t\tdreams\thttps://anidb.net/anime/8\thttps://anidb.net/anime/7"],
    );
    ingest(&db, &dump, "replace");

    let records = json_stdout(base_cmd(&db).args([
        "get",
        "--dataset",
        "anime-titles",
        "--key",
        "7",
        "--json",
    ]));
    assert_eq!(records[0]["relations"], serde_json::json!(["https://anidb.net/anime/8"]));
    assert_eq!(records[0]["sources"], serde_json::json!(["https://anidb.net/anime/7"]));

    base_cmd(&db)
        .args(["get", "--dataset", "anime-titles", "--id", "1"])
        .assert()
        .success()
        .stdout(contains("source: https://anidb.net/anime/7"));
}

#[test]
fn malformed_dump_fails_without_touching_the_store() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("catalog.db");
    let good = write_tsv(dir.path(), "good.tsv", &["1\ten\tofficial\tt\takira"]);
    let bad = write_tsv(
        dir.path(),
        "bad.tsv",
        &["2\ten\tofficial\tt\tredline", "3\ten\tofficial"],
    );

    ingest(&db, &good, "replace");
    base_cmd(&db)
        .args(["ingest", "--dataset", "anime-titles", "--mode", "replace"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(contains("line 2"));

    let hits = json_stdout(base_cmd(&db).args([
        "search",
        "--dataset",
        "anime-titles",
        "--json",
        "akira",
    ]));
    assert_eq!(hits.as_array().unwrap().len(), 1);
}

#[test]
fn read_commands_require_an_existing_database() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("missing.db");
    base_cmd(&db)
        .args(["search", "--dataset", "vn-titles", "anything"])
        .assert()
        .failure()
        .stderr(contains("no catalog database"));
    assert!(!db.exists());
}

#[test]
fn db_path_can_come_from_environment() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("env.db");
    let dump = write_tsv(dir.path(), "vn.tsv", &["v1\tja\tofficial\tt\tkanon"]);

    Command::new(assert_cmd::cargo::cargo_bin!("catsearch"))
        .env("CATALOG_DB", &db)
        .args(["ingest", "--dataset", "vn-titles"])
        .arg(&dump)
        .assert()
        .success();
    assert!(db.exists());
}

#[test]
fn completions_are_generated() {
    Command::new(assert_cmd::cargo::cargo_bin!("catsearch"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(contains("catsearch"));
}
