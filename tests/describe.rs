use std::io::Write;
use std::path::Path;

use qwery::types::Value;
use qwery::Engine;

const COMPANY_LIST: &str = "\
Symbol,Name,Sector,Industry,LastSale,MarketCap
XOM,\"Exxon Mobil Corp.\",Energy,Oil/Gas Transmission,87.23,370000000000
AAPL,Apple Inc.,Technology,Computer Manufacturing,172.1,2800000000000
";

fn company_list(dir: &Path) -> String {
    let path = dir.join("cl.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{COMPANY_LIST}").unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn describe_reports_column_type_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = company_list(dir.path());
    let db = Engine::new();
    let rows = db.run(&format!("DESCRIBE '{path}'")).unwrap();
    assert_eq!(rows.len(), 6, "one row per column");
    assert_eq!(rows[0].get("Column"), Some(&Value::from("Symbol")));
    assert_eq!(rows[0].get("Type"), Some(&Value::from("String")));
    assert_eq!(rows[0].get("Sample"), Some(&Value::from("XOM")));
    assert_eq!(rows[4].get("Column"), Some(&Value::from("LastSale")));
    assert_eq!(rows[4].get("Type"), Some(&Value::from("Double")));
    assert_eq!(rows[5].get("Type"), Some(&Value::from("Integer")));
}

#[test]
fn describe_truncates_to_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = company_list(dir.path());
    let db = Engine::new();
    let rows = db.run(&format!("DESCRIBE '{path}' LIMIT 3")).unwrap();
    assert_eq!(rows.len(), 3);
    let columns: Vec<&Value> = rows.iter().map(|r| r.get("Column").unwrap()).collect();
    assert_eq!(
        columns,
        [&Value::from("Symbol"), &Value::from("Name"), &Value::from("Sector")]
    );
}

#[test]
fn describe_a_sub_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = company_list(dir.path());
    let db = Engine::new();
    let rows = db
        .run(&format!(
            "DESCRIBE (SELECT Symbol, LastSale FROM '{path}')"
        ))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("Column"), Some(&Value::from("LastSale")));
}

#[test]
fn describe_empty_source_yields_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "a,b\n").unwrap();
    let db = Engine::new();
    let rows = db
        .run(&format!("DESCRIBE '{}'", path.to_str().unwrap()))
        .unwrap();
    assert!(rows.is_empty());
}
