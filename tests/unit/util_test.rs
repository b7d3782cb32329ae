//! Tests for date, time and identifier utilities

use chrono::NaiveDate;
use overseer::core::pool::SequenceGenerator;
use overseer::util::{init_tracing, ExecutionId, HourMinTime, MsgId, Odate, OdateValue, TaskOrderId};

#[test]
fn test_odate_parse_and_forms() {
    let odate: Odate = "20200909".parse().unwrap();
    assert_eq!(odate.as_str(), "20200909");
    assert_eq!(odate.odate(), "200909");
    assert_eq!(odate.format_date(), "2020-09-09");
    assert_eq!(odate.ymd(), (2020, 9, 9));
    // 2020-09-09 was a Wednesday.
    assert_eq!(odate.weekday(), 3);
    assert_eq!(odate.iso_week(), 37);
}

#[test]
fn test_odate_rejects_malformed_values() {
    assert!("2020909".parse::<Odate>().is_err());
    assert!("2020O909".parse::<Odate>().is_err());
    assert!("20200230".parse::<Odate>().is_err());
    assert!(Odate::from_date_string("2020/09/09").is_err());
    assert_eq!(Odate::from_date_string("2020-09-09").unwrap().as_str(), "20200909");
}

#[test]
fn test_odate_arithmetic_and_ordering() {
    let odate: Odate = "20201231".parse().unwrap();
    assert_eq!(odate.add_days(1).as_str(), "20210101");
    assert_eq!(odate.add_days(-31).as_str(), "20201130");
    assert!(odate.is_before(&odate.add_days(1)));
    assert!(!odate.is_before(&odate));
}

#[test]
fn test_odate_serde_as_string() {
    let odate: Odate = serde_json::from_str("\"20200909\"").unwrap();
    assert_eq!(serde_json::to_string(&odate).unwrap(), "\"20200909\"");
    assert!(serde_json::from_str::<Odate>("\"2020-09-09\"").is_err());
}

#[test]
fn test_odate_value_parse() {
    assert_eq!("ODATE".parse::<OdateValue>().unwrap(), OdateValue::Date);
    assert_eq!("PREV".parse::<OdateValue>().unwrap(), OdateValue::Prev);
    assert_eq!("NEXT".parse::<OdateValue>().unwrap(), OdateValue::Next);
    assert_eq!("*".parse::<OdateValue>().unwrap(), OdateValue::Any);
    assert_eq!("".parse::<OdateValue>().unwrap(), OdateValue::None);
    assert_eq!("+3".parse::<OdateValue>().unwrap(), OdateValue::Relative(3));
    assert_eq!("-1".parse::<OdateValue>().unwrap(), OdateValue::Relative(-1));
    assert!("TOMORROW".parse::<OdateValue>().is_err());
    assert!("+x".parse::<OdateValue>().is_err());
}

#[test]
fn test_hour_min_time() {
    let t: HourMinTime = "07:05".parse().unwrap();
    assert_eq!((t.hour(), t.minute()), (7, 5));
    assert_eq!(t.to_string(), "07:05");
    assert!("24:00".parse::<HourMinTime>().is_err());
    assert!("12:60".parse::<HourMinTime>().is_err());
    assert!("1200".parse::<HourMinTime>().is_err());

    let date = NaiveDate::from_ymd_opt(2020, 9, 9).unwrap();
    let at = t.on(date);
    assert_eq!(HourMinTime::from_datetime(&at), t);
    assert!("07:04".parse::<HourMinTime>().unwrap() < t);
}

#[test]
fn test_order_id_validation() {
    assert!(TaskOrderId::from("a0Z9x").validate().is_ok());
    assert!(TaskOrderId::from("A001").validate().is_err());
    assert!(TaskOrderId::from("A00-1").validate().is_err());
}

#[test]
fn test_sequence_ids_are_unique_and_valid() {
    let seq = SequenceGenerator::in_memory(0);
    let odate: Odate = "20200909".parse().unwrap();
    let ids: Vec<TaskOrderId> = (0..200).map(|_| seq.next(&odate)).collect();
    for id in &ids {
        assert!(id.validate().is_ok(), "{id}");
    }
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn test_random_ids_differ() {
    assert_ne!(MsgId::new(), MsgId::new());
    assert_ne!(ExecutionId::new(), ExecutionId::new());
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
