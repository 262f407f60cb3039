//! S6: temporal values round-tripped through the SQLite backend and read back with
//! `getDateTime`/`getTimestamp` (§8).

use dbpool::{Pool, SqlDate, SqlTime};

const MEMORY_URL: &str = "sqlite:///:memory:";

fn started_pool() -> Pool {
    let pool = dbpool::new_pool(MEMORY_URL).expect("valid url");
    pool.start().expect("pool starts");
    pool
}

#[test]
fn s6_datetime_and_timestamp_round_trip() {
    let pool = started_pool();
    let mut conn = pool.get_connection().unwrap();

    conn.execute("create table events(happened_at text, stamp integer)").unwrap();

    let insert = conn.prepare_statement("insert into events(happened_at, stamp) values (?, ?)").unwrap();
    {
        let stmt = conn.statement(insert).unwrap();
        stmt.set_string(1, Some("2013-12-28 10:12:42")).unwrap();
        stmt.set_timestamp(2, 1_387_066_378).unwrap();
        stmt.execute().unwrap();
    }

    let rs = conn.execute_query("select happened_at, stamp from events").unwrap();
    assert!(rs.next());

    let dt = rs.get_datetime(1).unwrap().unwrap();
    assert_eq!(dt.date, SqlDate { year: 2013, month: 11, day: 28 });
    assert_eq!(dt.time, SqlTime { hour: 10, min: 12, sec: 42, microseconds: 0 });

    let stamp = rs.get_timestamp(2).unwrap().unwrap();
    assert_eq!(stamp, 1_387_066_378);

    conn.close();
}

/// Testable property #5: the three equivalent timezone spellings from §8 all resolve to the
/// same instant, exercised through the facade's own re-export rather than calling into
/// `dbpool_core` directly.
#[test]
fn timezone_law_is_reexported_correctly() {
    let a = dbpool::temporal::to_timestamp("2013-12-15 00:12:58Z").unwrap();
    let b = dbpool::temporal::to_timestamp("2013-12-14 19:12:58-05:00").unwrap();
    let c = dbpool::temporal::to_timestamp("2013-12-15 05:57:58+05:45").unwrap();
    assert_eq!(a, 1_387_066_378);
    assert_eq!(b, 1_387_066_378);
    assert_eq!(c, 1_387_066_378);
}
