//! End-to-end scenarios against the SQLite backend (§8's S1-S5 and several of the numbered
//! testable-properties laws), exercising the facade crate's public surface the way a real
//! caller would: acquire a connection, issue statements, iterate a result set, return it.

use dbpool::Pool;

const MEMORY_URL: &str = "sqlite:///:memory:";

fn started_pool() -> Pool {
    let pool = dbpool::new_pool(MEMORY_URL).expect("valid url");
    pool.start().expect("pool starts");
    pool
}

/// S1: CRUD round-trip — create a table, prepared-insert 12 rows, `select count(*)` back 12.
#[test]
fn s1_crud_round_trip() {
    let pool = started_pool();
    let mut conn = pool.get_connection().expect("a connection is available");

    conn.execute("create table t(id integer primary key, name text, p real, b blob)").unwrap();

    let insert = conn.prepare_statement("insert into t(name, p, b) values (?, ?, ?)").unwrap();
    for i in 0..12 {
        let stmt = conn.statement(insert).unwrap();
        stmt.set_string(1, Some(&format!("row-{i}"))).unwrap();
        stmt.set_double(2, i as f64 * 1.5).unwrap();
        stmt.set_blob(3, Some(b"payload")).unwrap();
        stmt.execute().unwrap();
    }

    let count = {
        let rs = conn.execute_query("select count(*) from t").unwrap();
        assert!(rs.next());
        rs.get_llong(1).unwrap().unwrap()
    };
    assert_eq!(count, 12);

    conn.execute("drop table t").unwrap();
    conn.close();
}

/// S2: an 8192-byte blob whose first byte is 'S' and byte 8190 is 'E' round-trips exactly.
#[test]
fn s2_blob_binding() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();
    conn.execute("create table blobs(id integer primary key, data blob)").unwrap();

    let mut payload = vec![b'x'; 8192];
    payload[0] = b'S';
    payload[8190] = b'E';

    let insert = conn.prepare_statement("insert into blobs(data) values (?)").unwrap();
    {
        let stmt = conn.statement(insert).unwrap();
        stmt.set_blob(1, Some(&payload)).unwrap();
        stmt.execute().unwrap();
    }

    let rs = conn.execute_query("select data from blobs").unwrap();
    assert!(rs.next());
    let bytes = rs.get_blob(1).unwrap().unwrap();
    assert_eq!(bytes.len(), 8192);
    assert_eq!(bytes[0], b'S');
    assert_eq!(bytes[8190], b'E');

    conn.close();
}

/// S3: a bound NULL string round-trips as `isnull == true` and `getString == None`.
#[test]
fn s3_null_semantics() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();
    conn.execute("create table n(id integer primary key, s text)").unwrap();

    let insert = conn.prepare_statement("insert into n(s) values (?)").unwrap();
    {
        let stmt = conn.statement(insert).unwrap();
        stmt.set_string(1, None).unwrap();
        stmt.execute().unwrap();
    }

    let rs = conn.execute_query("select s from n").unwrap();
    assert!(rs.next());
    assert!(rs.isnull(1).unwrap());
    assert_eq!(rs.get_string(1).unwrap(), None);

    conn.close();
}

/// S5: running the same `create table` twice raises on the second call, and the pool (and
/// the connection) remain usable afterward.
#[test]
fn s5_exception_then_recovery() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();

    conn.execute("create table dup(id integer primary key)").unwrap();
    let err = conn.execute("create table dup(id integer primary key)");
    assert!(err.is_err());

    // The connection is still usable after the failure.
    conn.execute("insert into dup(id) values (1)").unwrap();
    let rs = conn.execute_query("select count(*) from dup").unwrap();
    assert!(rs.next());
    assert_eq!(rs.get_llong(1).unwrap(), Some(1));

    conn.close();
    assert_eq!(pool.active(), 0);
}

/// Testable property #6: `getXByName` agrees with `getXByIndex` for every valid column.
#[test]
fn column_accessors_agree_by_name_and_index() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();
    conn.execute("create table cols(a integer, b text)").unwrap();
    conn.execute("insert into cols(a, b) values (42, 'hi')").unwrap();

    let rs = conn.execute_query("select a, b from cols").unwrap();
    assert!(rs.next());
    assert_eq!(rs.get_int(1).unwrap(), rs.get_int_by_name("a").unwrap());
    assert_eq!(rs.get_string(2).unwrap(), rs.get_string_by_name("b").unwrap());

    conn.close();
}

/// Testable property #7: `maxRows` forces `next()` to return `min(N, k)` times.
#[test]
fn max_rows_is_enforced() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();
    conn.execute("create table rows5(id integer primary key)").unwrap();
    for i in 0..5 {
        conn.execute(&format!("insert into rows5(id) values ({i})")).unwrap();
    }

    conn.set_max_rows(3).unwrap();
    let rs = conn.execute_query("select id from rows5").unwrap();
    let mut seen = 0;
    while rs.next() {
        seen += 1;
    }
    assert_eq!(seen, 3);

    conn.close();
}

/// Testable property #9: re-executing a prepared statement with new parameters produces a
/// fresh result set, and reusing the statement disposes the previous one.
#[test]
fn prepared_statement_reexecution_is_fresh() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();
    conn.execute("create table kv(k text, v integer)").unwrap();
    conn.execute("insert into kv values ('a', 1), ('b', 2)").unwrap();

    let select = conn.prepare_statement("select v from kv where k = ?").unwrap();

    {
        let stmt = conn.statement(select).unwrap();
        stmt.set_string(1, Some("a")).unwrap();
        let rs = stmt.execute_query().unwrap();
        assert!(rs.next());
        assert_eq!(rs.get_int(1).unwrap(), Some(1));
    }
    {
        let stmt = conn.statement(select).unwrap();
        stmt.set_string(1, Some("b")).unwrap();
        let rs = stmt.execute_query().unwrap();
        assert!(rs.next());
        assert_eq!(rs.get_int(1).unwrap(), Some(2));
    }

    conn.close();
}

/// Testable property #10: returning a connection mid-transaction rolls it back; nothing from
/// the aborted transaction is visible afterward.
///
/// Pinned to a single physical connection (`initial = max = 1`): each backing
/// `rusqlite::Connection` is its own private in-memory database, so the test must guarantee
/// the same physical connection is handed out on every `get_connection()` call for the table
/// created in the first acquisition to still be there in the third.
#[test]
fn transaction_rolls_back_on_return() {
    let pool = dbpool::new_pool(MEMORY_URL).unwrap();
    pool.set_initial_connections(1).unwrap();
    pool.set_max_connections(1).unwrap();
    pool.start().unwrap();

    {
        let mut conn = pool.get_connection().unwrap();
        conn.execute("create table txn(id integer primary key)").unwrap();
        conn.close();
    }

    let physical_count_before = pool.size();
    {
        let mut conn = pool.get_connection().unwrap();
        conn.begin_transaction().unwrap();
        conn.execute("insert into txn(id) values (1)").unwrap();
        assert_eq!(conn.transaction_depth(), 1);
        // Dropped without commit: Drop rolls back and returns the connection to the pool.
    }
    assert_eq!(pool.size(), physical_count_before);

    let mut conn = pool.get_connection().unwrap();
    let rs = conn.execute_query("select count(*) from txn").unwrap();
    assert!(rs.next());
    assert_eq!(rs.get_llong(1).unwrap(), Some(0));
    conn.close();
}

/// Testable properties #1/#2: `size <= maxConnections` and `active <= size` throughout, and
/// `stop` drains the pool to zero.
#[test]
fn pool_size_invariants_hold() {
    let pool = dbpool::new_pool(MEMORY_URL).unwrap();
    pool.set_initial_connections(2).unwrap();
    pool.set_max_connections(5).unwrap();
    pool.start().unwrap();

    assert!(pool.size() <= 5);
    let mut held = Vec::new();
    for _ in 0..5 {
        if let Some(c) = pool.get_connection() {
            held.push(c);
        }
    }
    assert!(pool.size() <= 5);
    assert!(pool.active() <= pool.size());
    assert!(pool.get_connection().is_none(), "cap reached, getConnection returns None immediately");

    drop(held);
    pool.stop();
    assert_eq!(pool.size(), 0);
}

/// S4 / testable property #8: a pool grown to its cap and fully returned is reaped back down
/// to its `initial` floor once every connection is older than `connectionTimeoutSeconds`.
#[test]
fn reaper_evicts_down_to_initial_floor() {
    let pool = dbpool::new_pool(MEMORY_URL).unwrap();
    pool.set_initial_connections(4).unwrap();
    pool.set_max_connections(20).unwrap();
    pool.set_connection_timeout(1).unwrap();
    pool.start().unwrap();

    let mut held = Vec::new();
    for _ in 0..20 {
        held.push(pool.get_connection().expect("under cap"));
    }
    assert_eq!(pool.size(), 20);
    drop(held);
    assert_eq!(pool.active(), 0);

    std::thread::sleep(std::time::Duration::from_millis(1_200));
    pool.reap_connections();

    assert_eq!(pool.size(), 4);
    assert_eq!(pool.active(), 0);

    pool.stop();
}
