use qwery::types::Value;
use qwery::Engine;

#[test]
fn declare_set_select_expression() {
    let db = Engine::new();
    let rows = db
        .run("DECLARE @x DOUBLE; SET @x = 2 * 3 + 1; SELECT @x AS v")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("v"), Some(&Value::from(7.0)));
}

#[test]
fn variables_persist_across_runs() {
    let db = Engine::new();
    db.run("DECLARE @name STRING").unwrap();
    db.run("SET @name = 'qwery'").unwrap();
    let rows = db.run("SELECT @name AS who, UPPER(@name) AS loud").unwrap();
    assert_eq!(rows[0].get("who"), Some(&Value::from("qwery")));
    assert_eq!(rows[0].get("loud"), Some(&Value::from("QWERY")));
}

#[test]
fn assignment_casts_to_the_declared_type() {
    let db = Engine::new();
    db.run("DECLARE @n INTEGER; SET @n = '42'").unwrap();
    let rows = db.run("SELECT @n AS n").unwrap();
    assert_eq!(rows[0].get("n"), Some(&Value::Int64(42)));
    // an uncastable value is an error
    assert!(db.run("SET @n = 'not a number'").is_err());
}

#[test]
fn set_without_declare_is_an_error() {
    let db = Engine::new();
    let err = db.run("SET @ghost = 1").unwrap_err();
    assert!(err.to_string().contains("undeclared variable"));
}

#[test]
fn set_from_a_scalar_sub_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("n.csv");
    std::fs::write(&path, "v\n5\n9\n2\n").unwrap();
    let path = path.to_str().unwrap();
    let db = Engine::new();
    db.run(&format!(
        "DECLARE @top DOUBLE; SET @top = (SELECT MAX(v) FROM '{path}')"
    ))
    .unwrap();
    let rows = db.run("SELECT @top AS top").unwrap();
    assert_eq!(rows[0].get("top"), Some(&Value::from(9.0)));
}

#[test]
fn show_variables_views_connections() {
    let db = Engine::new();
    db.run("DECLARE @x INTEGER; SET @x = 3").unwrap();
    let rows = db.run("SHOW VARIABLES").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Variable"), Some(&Value::from("@x")));
    assert_eq!(rows[0].get("Type"), Some(&Value::from("Integer")));
    assert_eq!(rows[0].get("Value"), Some(&Value::Int64(3)));

    assert!(db.run("SHOW VIEWS").unwrap().is_empty());
    db.run("CREATE VIEW nothing AS SELECT 1 AS one").unwrap();
    let views = db.run("SHOW VIEWS").unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].get("View"), Some(&Value::from("nothing")));
    assert_eq!(
        views[0].get("Definition"),
        Some(&Value::from("SELECT 1 AS one"))
    );

    db.run("CONNECT TO 'jdbc:h2:mem' AS h2").unwrap();
    let connections = db.run("SHOW CONNECTIONS").unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].get("Connection"), Some(&Value::from("h2")));
    assert_eq!(
        connections[0].get("Service"),
        Some(&Value::from("jdbc:h2:mem"))
    );
    db.run("DISCONNECT FROM h2").unwrap();
    assert!(db.run("SHOW CONNECTIONS").unwrap().is_empty());
}

#[test]
fn disconnect_unknown_handle_is_an_error() {
    let db = Engine::new();
    let err = db.run("DISCONNECT FROM nope").unwrap_err();
    assert!(err.to_string().contains("unknown connection"));
}

#[test]
fn from_less_select_yields_one_row() {
    let db = Engine::new();
    let rows = db
        .run("SELECT 1 + 1 AS two, 'x' AS tag, CASE WHEN 1 = 1 THEN 'yes' END AS sure")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("two"), Some(&Value::Int64(2)));
    assert_eq!(rows[0].get("sure"), Some(&Value::from("yes")));
}

#[test]
fn syntax_errors_carry_a_position() {
    let db = Engine::new();
    let err = db.run("FRob 'x.csv'").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("parse error"), "got: {text}");
    assert!(text.contains("line 1"), "got: {text}");
    assert!(text.contains("FRob"), "got: {text}");
}

#[test]
fn division_by_zero_is_an_eval_error() {
    let db = Engine::new();
    let err = db.run("SELECT 1 / 0 AS boom").unwrap_err();
    assert!(err.to_string().contains("division by zero"));
}
