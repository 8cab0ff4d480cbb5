use rstest::rstest;
use std::{cell::Cell, io::Read, rc::Rc};
use tidal::{
    BackendCell, ConvertFailure, Date, Error, ErrorKind, Interval, Numeric, Result, SharedCell,
    Time, Timestamp, Type, Value, Variant,
};

/// Reads `variant` through the typed accessor of its own type.
fn read_as_own_type(variant: &Variant) -> Result<Value> {
    Ok(match variant.datatype() {
        Type::Int8 => variant.get::<i8>()?.into(),
        Type::UInt8 => variant.get::<u8>()?.into(),
        Type::Int16 => variant.get::<i16>()?.into(),
        Type::UInt16 => variant.get::<u16>()?.into(),
        Type::Int32 => variant.get::<i32>()?.into(),
        Type::UInt32 => variant.get::<u32>()?.into(),
        Type::Int64 => variant.get::<i64>()?.into(),
        Type::UInt64 => variant.get::<u64>()?.into(),
        Type::Boolean => variant.get::<bool>()?.into(),
        Type::VarChar => variant.get::<String>()?.into(),
        Type::Memo => Value::Memo(variant.get::<String>()?),
        Type::Blob => variant.get::<Vec<u8>>()?.into(),
        Type::Numeric => variant.get::<Numeric>()?.into(),
        Type::Float => variant.get::<f32>()?.into(),
        Type::Double => variant.get::<f64>()?.into(),
        Type::Date => variant.get::<Date>()?.into(),
        Type::Time => variant.get::<Time>()?.into(),
        Type::Timestamp => variant.get::<Timestamp>()?.into(),
        Type::Interval => variant.get::<Interval>()?.into(),
        Type::Custom(tag) => Value::Custom {
            tag,
            bytes: variant.get::<Vec<u8>>()?,
        },
        ty => panic!("no accessor for {ty}"),
    })
}

#[rstest]
#[case::int8(Value::Int8(i8::MIN))]
#[case::uint8(Value::UInt8(u8::MAX))]
#[case::int16(Value::Int16(-17))]
#[case::uint16(Value::UInt16(u16::MAX))]
#[case::int32(Value::Int32(i32::MIN))]
#[case::uint32(Value::UInt32(u32::MAX))]
#[case::int64(Value::Int64(i64::MIN))]
#[case::uint64(Value::UInt64(u64::MAX))]
#[case::boolean(Value::Boolean(true))]
#[case::text(Value::Text("grüße".to_owned()))]
#[case::memo(Value::Memo("x".repeat(1000)))]
#[case::blob(Value::Blob(vec![0, 0xff, 7]))]
#[case::numeric(Value::Numeric(Numeric::new(12345, 2).unwrap()))]
#[case::float(Value::Float(0.25))]
#[case::double(Value::Double(-1.5e300))]
#[case::date(Value::Date(Date::new(2024, 2, 29).unwrap()))]
#[case::time(Value::Time(Time::new(23, 59, 58).unwrap()))]
#[case::timestamp(Value::Timestamp(
    Timestamp::new(Date::new(1969, 12, 31).unwrap(), Time::new(12, 0, 0).unwrap(), 250).unwrap()
))]
#[case::interval(Value::Interval(Interval::new(-14, 3, 1_500_000)))]
#[case::custom(Value::Custom { tag: 7, bytes: vec![1, 2, 3] })]
fn identity_and_null_reads(#[case] value: Value) {
    let variant = Variant::from(value.clone());
    assert_eq!(variant.datatype(), value.datatype());
    assert_eq!(variant.value().unwrap(), value);
    assert_eq!(read_as_own_type(&variant).unwrap(), value);

    let null = Variant::null_of(value.datatype());
    assert!(null.is_null());
    assert_eq!(null.datatype(), value.datatype());
    assert_eq!(read_as_own_type(&null).unwrap_err().kind(), ErrorKind::NullValue);
}

#[test]
fn null_error_names_the_column() {
    let variant = Variant::named(Variant::null_of(Type::Int32), "age");
    let err = variant.as_int().unwrap_err();
    assert!(err.to_string().contains("age"));
    assert_eq!(variant.get_opt::<i32>().unwrap(), None);
}

#[rstest]
#[case::date_to_int(Variant::from(Date::new(2024, 1, 2).unwrap()), Type::Int32)]
#[case::memo_to_int(Variant::memo("12"), Type::Int32)]
#[case::bool_to_double(Variant::from(true), Type::Double)]
#[case::blob_to_text(Variant::from(vec![1u8, 2]), Type::VarChar)]
fn undeclared_conversions_fail(#[case] variant: Variant, #[case] target: Type) {
    assert!(!tidal::can_convert(variant.datatype(), target));
    let err = tidal::convert(&variant.value().unwrap(), target).unwrap_err();
    assert_eq!(err.reason(), &ConvertFailure::Unsupported);
    assert_eq!(err.source_type(), variant.datatype());
    assert_eq!(err.target_type(), target);
}

#[test]
fn typed_accessor_enforces_declared_conversions() {
    let variant = Variant::from(Date::new(2024, 1, 2).unwrap());
    match variant.as_int() {
        Err(Error::Convert(e)) => {
            assert_eq!(e.source_type(), Type::Date);
            assert_eq!(e.target_type(), Type::Int32);
        }
        other => panic!("expected a conversion error, got {other:?}"),
    }
    assert_eq!(variant.as_string().unwrap(), "2024-01-02");
    assert_eq!(
        variant.as_timestamp().unwrap(),
        Timestamp::from(Date::new(2024, 1, 2).unwrap())
    );
}

#[rstest]
#[case::i8(Variant::from(i64::MAX), Type::Int8)]
#[case::u32_negative(Variant::from(-1i32), Type::UInt32)]
#[case::u64_to_i64(Variant::from(u64::MAX), Type::Int64)]
#[case::text(Variant::from("300"), Type::UInt8)]
fn narrowing_is_range_checked(#[case] variant: Variant, #[case] target: Type) {
    let err = tidal::convert(&variant.value().unwrap(), target).unwrap_err();
    assert_eq!(err.reason(), &ConvertFailure::OutOfRange);
}

#[test]
fn narrowing_accessor_fails_out_of_range() {
    let variant = Variant::from(i64::MAX);
    let err = variant.as_i8().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Convert);
    assert_eq!(Variant::from(100i64).as_i8().unwrap(), 100);
}

#[test]
fn numeric_keeps_its_scale() {
    let a = Numeric::new(12345, 2).unwrap();
    let b = Numeric::new(123_450, 3).unwrap();
    assert_ne!(a, b);
    assert_eq!(a.cmp_value(&b), std::cmp::Ordering::Equal);

    let variant = Variant::from(b);
    assert_eq!(variant.as_numeric().unwrap().scale(), 3);
    assert_eq!(variant.as_string().unwrap(), "123.450");
}

#[test]
fn numeric_to_integer_requires_integral_value() {
    assert_eq!(Variant::from(Numeric::new(4200, 2).unwrap()).as_int().unwrap(), 42);
    let err = Variant::from(Numeric::new(4201, 2).unwrap()).as_int().unwrap_err();
    match err {
        Error::Convert(e) => assert_eq!(e.reason(), &ConvertFailure::Inexact),
        e => panic!("unexpected error {e}"),
    }
}

#[test]
fn null_flag_and_set() {
    let mut variant = Variant::null_of(Type::Int32);
    assert!(variant.as_int().is_err());
    assert!(variant.is_null());
    variant.set_null(false).unwrap();
    variant.set(5).unwrap();
    assert!(!variant.is_null());
    assert_eq!(variant.as_int().unwrap(), 5);
}

#[test]
fn set_null_keeps_payload() {
    let mut variant = Variant::from("kept");
    variant.set_null(true).unwrap();
    assert!(variant.as_string().is_err());
    variant.set_null(false).unwrap();
    assert_eq!(variant.as_string().unwrap(), "kept");
}

#[test]
fn assign_copies_value_or_null() {
    let mut target = Variant::from(1i64);
    target.assign(&Variant::from("two")).unwrap();
    assert_eq!(target.as_string().unwrap(), "two");
    target.assign(&Variant::null_of(Type::VarChar)).unwrap();
    assert!(target.is_null());
}

#[test]
fn deepcopy_is_independent_of_observed_cell() {
    let cell = SharedCell::with_value(10i32);
    let observing = Variant::observe(&cell);
    let copy = observing.deepcopy();
    let cloned = observing.clone();
    let duplicate = observing.duplicate();

    cell.set(20i32).unwrap();
    assert_eq!(observing.as_int().unwrap(), 20);
    assert_eq!(duplicate.as_int().unwrap(), 20);
    assert_eq!(copy.as_int().unwrap(), 10);
    assert_eq!(cloned.as_int().unwrap(), 10);
    assert!(!copy.is_observing());

    cell.set_to_null();
    assert!(observing.is_null());
    assert!(!copy.is_null());
}

#[test]
fn observing_variant_writes_through() {
    let cell = SharedCell::new(Type::Int64);
    let mut variant = Variant::observe(&cell);
    assert!(variant.is_null());
    variant.set(7i8).unwrap();
    assert_eq!(cell.get(), Some(Value::Int64(7)));
    assert_eq!(variant.datatype(), Type::Int64);

    // Writes are converted to the cell's type.
    assert!(variant.set("not a number").is_err());
    assert_eq!(cell.get(), Some(Value::Int64(7)));
}

#[test]
fn lob_streams() {
    let blob = Variant::from(vec![1u8, 2, 3, 4]);
    let mut stream = blob.as_blob().unwrap();
    let mut buf = [0; 3];
    assert_eq!(stream.read(&mut buf).unwrap(), 3);
    assert_eq!(stream.remaining(), 1);

    let memo = Variant::memo("héllo");
    let mut stream = memo.as_memo().unwrap();
    assert_eq!(stream.next_chunk(2), Some("h"));
    assert_eq!(stream.next_chunk(2), Some("é"));
    assert_eq!(stream.next_chunk(10), Some("llo"));
    assert_eq!(stream.next_chunk(10), None);

    assert!(Variant::from(1i32).as_memo().is_err());
}

#[test]
fn display() {
    assert_eq!(Variant::from(Numeric::new(12345, 2).unwrap()).to_string(), "123.45");
    assert_eq!(Variant::null_of(Type::Date).to_string(), "NULL");
    assert_eq!(Variant::from(true).to_string(), "true");
}

/// A read-only cell that counts how often it is dropped.
struct CountingCell {
    drops: Rc<Cell<usize>>,
}

impl BackendCell for CountingCell {
    fn datatype(&self) -> Type {
        Type::Int32
    }

    fn is_null(&self) -> bool {
        false
    }

    fn value(&self) -> Result<Option<Value>> {
        Ok(Some(Value::Int32(3)))
    }
}

impl Drop for CountingCell {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn backend_cell_is_released_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let variant = Variant::from_cell(
        Box::new(CountingCell {
            drops: drops.clone(),
        }),
        Some("n".to_owned()),
    );
    let copy = variant.clone();
    let duplicate = variant.duplicate();
    assert!(!duplicate.is_observing());
    drop(variant);
    assert_eq!(drops.get(), 1);
    drop(copy);
    drop(duplicate);
    assert_eq!(drops.get(), 1);
}

#[test]
fn read_only_cell_rejects_writes() {
    let drops = Rc::new(Cell::new(0));
    let mut variant = Variant::from_cell(Box::new(CountingCell { drops }), Some("n".to_owned()));
    let err = variant.set(4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
    assert!(err.to_string().contains("\"n\""));
    assert_eq!(variant.set_null(true).unwrap_err().kind(), ErrorKind::ReadOnly);
    assert_eq!(variant.as_int().unwrap(), 3);
}

/// A cell whose engine fails to produce the value.
struct FailingCell;

impl BackendCell for FailingCell {
    fn datatype(&self) -> Type {
        Type::Blob
    }

    fn is_null(&self) -> bool {
        false
    }

    fn value(&self) -> Result<Option<Value>> {
        Err(Error::Engine(tidal::EngineError::new(tidal::Diagnostic::error(
            "XX001",
            "Corrupt row",
        ))))
    }
}

#[test]
fn cell_read_failure_is_reported() {
    let variant = Variant::from_cell(Box::new(FailingCell), Some("data".to_owned()));
    let err = variant.as_bytes().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert_eq!(err.sqlstate(), Some("XX001"));
    assert!(variant.as_blob().is_err());

    let copy = variant.deepcopy();
    assert!(copy.is_null());
    let mut target = Variant::new();
    assert_eq!(target.assign(&variant).unwrap_err().kind(), ErrorKind::Engine);
}

#[rstest]
#[case::float(Variant::from(16_777_217i64), Type::Float)]
#[case::double(Variant::from(u64::MAX - 1), Type::Double)]
#[case::timestamp_fraction(Variant::from("2024-01-02 03:04:05.75"), Type::Int64)]
fn lossy_conversions_fail(#[case] variant: Variant, #[case] target: Type) {
    let value = match target {
        Type::Int64 => Value::Timestamp(variant.as_timestamp().unwrap()),
        _ => variant.value().unwrap(),
    };
    let err = tidal::convert(&value, target).unwrap_err();
    assert_eq!(err.reason(), &ConvertFailure::Inexact);
}

#[test]
fn exact_conversions_to_float_succeed() {
    assert_eq!(Variant::from(16_777_216i64).as_f32().unwrap(), 16_777_216.0);
    assert_eq!(Variant::from(-(1i64 << 53)).as_f64().unwrap(), -(2f64.powi(53)));
    let whole = Variant::from("2024-01-02 03:04:05").as_timestamp().unwrap();
    assert_eq!(Variant::from(whole).as_i64().unwrap(), 1_704_164_645);
}

#[rstest]
#[case::seconds("PT9223372036854.999999S")]
#[case::months("P178956970Y8M")]
#[case::hours("PT2562047789H")]
fn interval_overflow_is_a_parse_error(#[case] text: &str) {
    assert!(text.parse::<Interval>().is_err());
    assert_eq!(Variant::from(text).as_interval().unwrap_err().kind(), ErrorKind::Convert);
}

#[test]
fn extreme_years_display() {
    let earliest: Date = "-2147483648-01-01".parse().unwrap();
    assert_eq!(earliest.year(), i32::MIN);
    assert_eq!(earliest.to_string(), "-2147483648-01-01");
    assert_eq!(Variant::from(earliest).as_string().unwrap(), "-2147483648-01-01");
    let latest = Date::new(i32::MAX, 12, 31).unwrap();
    assert_eq!(latest.to_string(), "2147483647-12-31");
}

#[test]
fn numeric_scale_is_bounded() {
    assert!(Numeric::new(1, Numeric::MAX_SCALE).is_some());
    assert!(Numeric::new(1, Numeric::MAX_SCALE + 1).is_none());
}
