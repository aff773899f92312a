use std::io::Write;
use std::path::Path;

use qwery::types::Value;
use qwery::Engine;

const COMPANY_LIST: &str = "\
Symbol,Name,Sector,Industry,LastSale,MarketCap
XOM,\"Exxon Mobil Corp.\",Energy,Oil/Gas Transmission,87.23,370000000000
AAPL,Apple Inc.,Technology,Computer Manufacturing,172.1,2800000000000
MSFT,Microsoft Corporation,Technology,Software,309.4,2300000000000
CSCO,\"Cisco Systems, Inc.\",Technology,Networking,48.5,200000000000
JPM,JPMorgan Chase,Finance,Banks,155.3,450000000000
KO,Coca-Cola Company,Consumer,Beverages,60.1,260000000000
";

fn company_list(dir: &Path) -> String {
    let path = dir.join("companylist.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{COMPANY_LIST}").unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn values_insert_writes_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("k.csv");
    let path = path.to_str().unwrap();
    let db = Engine::new();
    let rows = db
        .run(&format!(
            "INSERT INTO '{path}' (a, b) VALUES (1, 'x') VALUES (2, 'y')"
        ))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("inserted"), Some(&Value::Int64(2)));

    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3, "header plus two data rows");
    assert_eq!(lines[1], "1,\"x\"");
    assert_eq!(lines[2], "2,\"y\"");
}

#[test]
fn insert_into_appends_without_a_second_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("k.csv");
    let path = path.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!("INSERT INTO '{path}' (a, b) VALUES (1, 'x')"))
        .unwrap();
    db.run(&format!("INSERT INTO '{path}' (a, b) VALUES (2, 'y')"))
        .unwrap();
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content.lines().count(), 3, "one header, two data rows");
    // and everything reads back
    let rows = db.run(&format!("SELECT * FROM '{path}'")).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("b"), Some(&Value::from("y")));
}

#[test]
fn insert_overwrite_json_replaces_prior_content() {
    let dir = tempfile::tempdir().unwrap();
    let source = company_list(dir.path());
    let target = dir.path().join("out.json");
    let target = target.to_str().unwrap();
    std::fs::write(target, "stale content\n").unwrap();

    let db = Engine::new();
    db.run(&format!(
        "INSERT OVERWRITE '{target}' WITH JSON FORMAT (Symbol, Name) \
         SELECT Symbol, Name FROM '{source}' WITH CSV FORMAT WHERE Sector = 'Technology'"
    ))
    .unwrap();

    let content = std::fs::read_to_string(target).unwrap();
    assert!(!content.contains("stale"));
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "{\"Symbol\":\"AAPL\",\"Name\":\"Apple Inc.\"}");

    // and the engine reads its own output back
    let rows = db.run(&format!("SELECT Symbol FROM '{target}'")).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("Symbol"), Some(&Value::from("CSCO")));
}

#[test]
fn select_into_is_insert() {
    let dir = tempfile::tempdir().unwrap();
    let source = company_list(dir.path());
    let target = dir.path().join("finance.csv");
    let target = target.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!(
        "SELECT Symbol, Name INTO '{target}' FROM '{source}' WHERE Sector = 'Finance'"
    ))
    .unwrap();
    let rows = db.run(&format!("SELECT * FROM '{target}'")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Symbol"), Some(&Value::from("JPM")));
}

#[test]
fn insert_select_star_round_trips_the_multiset() {
    let dir = tempfile::tempdir().unwrap();
    let source = company_list(dir.path());
    let target = dir.path().join("copy.csv");
    let target = target.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!(
        "INSERT OVERWRITE '{target}' (Symbol, Name, Sector, Industry, LastSale, MarketCap) \
         SELECT * FROM '{source}'"
    ))
    .unwrap();
    let original = db.run(&format!("SELECT * FROM '{source}'")).unwrap();
    let copied = db.run(&format!("SELECT * FROM '{target}'")).unwrap();
    assert_eq!(copied, original);
}

#[test]
fn gzip_output_reads_back_transparently() {
    let dir = tempfile::tempdir().unwrap();
    let source = company_list(dir.path());
    let target = dir.path().join("out.csv.gz");
    let target = target.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!(
        "INSERT OVERWRITE '{target}' (Symbol) SELECT Symbol FROM '{source}' LIMIT 2"
    ))
    .unwrap();
    let rows = db.run(&format!("SELECT * FROM '{target}'")).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("Symbol"), Some(&Value::from("XOM")));
}

#[test]
fn insert_reorders_by_declared_fields() {
    let dir = tempfile::tempdir().unwrap();
    let source = company_list(dir.path());
    let target = dir.path().join("names.csv");
    let target = target.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!(
        "INSERT OVERWRITE '{target}' (Name, Symbol) SELECT Symbol, Name FROM '{source}' LIMIT 1"
    ))
    .unwrap();
    let content = std::fs::read_to_string(target).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "\"Name\",\"Symbol\"");
    assert_eq!(lines[1], "\"Exxon Mobil Corp.\",\"XOM\"");
}
