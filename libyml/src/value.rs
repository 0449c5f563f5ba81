//! Native value representation.
//!
//! Collections are shared: cloning a `Sequence`, `Mapping` or `Tagged` value
//! clones a reference to the same container, so anchors and aliases decode
//! into values that are identical, not merely equal, and a container may
//! hold itself.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Shared, mutable list of items.
pub type SequenceRef = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable list of key/value pairs in document order.
pub type MappingRef = Rc<RefCell<Vec<(Value, Value)>>>;

/// A value whose tag has no dedicated constructor.
#[derive(Clone)]
pub struct Tagged {
    pub tag: String,
    pub value: Value,
}

/// A `!!timestamp` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// `2001-12-14`
    Date(NaiveDate),
    /// `2001-12-14 21:59:43.10`, no zone given.
    Naive(NaiveDateTime),
    /// `2001-12-14t21:59:43.10-05:00`
    Offset(DateTime<FixedOffset>),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Timestamp::Naive(datetime) => write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.f")),
            Timestamp::Offset(datetime) => {
                write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.f"))?;
                if datetime.offset().local_minus_utc() == 0 {
                    write!(f, "Z")
                } else {
                    write!(f, "{}", datetime.format("%:z"))
                }
            }
        }
    }
}

/// A decoded value.
#[derive(Clone)]
pub enum Value {
    /// `~`, `null` or an empty node.
    Null,
    Bool(bool),
    /// Arbitrary-precision integer.
    Integer(BigInt),
    Float(f64),
    String(String),
    /// `!!binary` data.
    Binary(Vec<u8>),
    Timestamp(Timestamp),
    Sequence(SequenceRef),
    Mapping(MappingRef),
    /// A value carrying a tag the constructor does not know.
    Tagged(Rc<Tagged>),
}

impl Value {
    /// A new, unshared sequence.
    pub fn sequence(items: Vec<Value>) -> Self {
        Value::Sequence(Rc::new(RefCell::new(items)))
    }

    /// A new, unshared mapping.
    pub fn mapping(pairs: Vec<(Value, Value)>) -> Self {
        Value::Mapping(Rc::new(RefCell::new(pairs)))
    }

    pub fn tagged(tag: impl Into<String>, value: Value) -> Self {
        Value::Tagged(Rc::new(Tagged {
            tag: tag.into(),
            value,
        }))
    }

    /// Returns `true` if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// The integer, if it is one and fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(ToPrimitive::to_i64)
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceRef> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&MappingRef> {
        match self {
            Value::Mapping(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_tagged(&self) -> Option<&Tagged> {
        match self {
            Value::Tagged(tagged) => Some(tagged),
            _ => None,
        }
    }

    /// The item at `index` of a sequence.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        self.as_sequence()?.borrow().get(index).cloned()
    }

    /// The value under the string key `key` of a mapping.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_mapping()?
            .borrow()
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v.clone())
    }

    /// Number of items or pairs of a collection.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Sequence(items) => Some(items.borrow().len()),
            Value::Mapping(pairs) => Some(pairs.borrow().len()),
            _ => None,
        }
    }

    /// Address of the shared container, for collections and tagged values.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Sequence(items) => Some(Rc::as_ptr(items) as *const () as usize),
            Value::Mapping(pairs) => Some(Rc::as_ptr(pairs) as *const () as usize),
            Value::Tagged(tagged) => Some(Rc::as_ptr(tagged) as *const () as usize),
            _ => None,
        }
    }

    /// Whether both values are the same shared container.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality. Cyclic values compare equal when they unfold
    /// to the same infinite tree.
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, &mut HashSet::new())
    }
}

/// Containers already paired up in `assumed` count as equal, which cuts
/// every cycle after one turn.
fn values_equal(a: &Value, b: &Value, assumed: &mut HashSet<(usize, usize)>) -> bool {
    if let (Some(x), Some(y)) = (a.identity(), b.identity()) {
        if x == y || !assumed.insert((x, y)) {
            return true;
        }
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Binary(a), Value::Binary(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        (Value::Sequence(a), Value::Sequence(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y, assumed))
        }
        (Value::Mapping(a), Value::Mapping(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| values_equal(ka, kb, assumed) && values_equal(va, vb, assumed))
        }
        (Value::Tagged(a), Value::Tagged(b)) => a.tag == b.tag && values_equal(&a.value, &b.value, assumed),
        _ => false,
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_value(self, f, &mut Vec::new())
    }
}

/// Writes a value, printing `<cycle>` for a container inside itself.
fn debug_value(value: &Value, f: &mut fmt::Formatter<'_>, open: &mut Vec<usize>) -> fmt::Result {
    if let Some(id) = value.identity() {
        if open.contains(&id) {
            return write!(f, "<cycle>");
        }
        open.push(id);
    }
    let result = match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Integer(n) => write!(f, "{}", n),
        Value::Float(n) => {
            if n.is_nan() {
                write!(f, ".nan")
            } else if n.is_infinite() {
                write!(f, "{}", if *n > 0.0 { ".inf" } else { "-.inf" })
            } else {
                write!(f, "{:?}", n)
            }
        }
        Value::String(s) => write!(f, "{:?}", s),
        Value::Binary(b) => {
            write!(f, "<")?;
            for byte in b {
                write!(f, "{:02x}", byte)?;
            }
            write!(f, ">")
        }
        Value::Timestamp(t) => write!(f, "{}", t),
        Value::Sequence(items) => {
            write!(f, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                debug_value(item, f, open)?;
            }
            write!(f, "]")
        }
        Value::Mapping(pairs) => {
            write!(f, "{{")?;
            for (i, (k, v)) in pairs.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                debug_value(k, f, open)?;
                write!(f, ": ")?;
                debug_value(v, f, open)?;
            }
            write!(f, "}}")
        }
        Value::Tagged(tagged) => {
            write!(f, "!<{}> ", tagged.tag)?;
            debug_value(&tagged.value, f, open)
        }
    };
    if value.identity().is_some() {
        open.pop();
    }
    result
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::sequence(items)
    }
}

impl From<Vec<(Value, Value)>> for Value {
    fn from(pairs: Vec<(Value, Value)>) -> Self {
        Value::mapping(pairs)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_collections() {
        let a = Value::sequence(vec![Value::from(1)]);
        let b = a.clone();
        b.as_sequence().unwrap().borrow_mut().push(Value::from(2));
        assert_eq!(a.len(), Some(2));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Value::sequence(vec![Value::from(1), Value::from(2)])));
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::mapping(vec![("k".into(), Value::sequence(vec![Value::Null]))]);
        let b = Value::mapping(vec![("k".into(), Value::sequence(vec![Value::Null]))]);
        assert_eq!(a, b);
        assert_ne!(a, Value::mapping(Vec::new()));
        assert_ne!(Value::from(1), Value::from(1.0));
    }

    #[test]
    fn test_debug_marks_cycles() {
        let a = Value::sequence(Vec::new());
        a.as_sequence().unwrap().borrow_mut().push(a.clone());
        assert_eq!(format!("{:?}", a), "[<cycle>]");
        // A self-containing value is equal to itself without recursing.
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_distinct_cycles_compare() {
        let self_seq = || {
            let s = Value::sequence(Vec::new());
            s.as_sequence().unwrap().borrow_mut().push(s.clone());
            s
        };
        assert_eq!(self_seq(), self_seq());

        // [x, <self>] against [y, <self>] differs on the first item.
        let with_item = |item: &str| {
            let s = Value::sequence(vec![Value::from(item)]);
            s.as_sequence().unwrap().borrow_mut().push(s.clone());
            s
        };
        assert_eq!(with_item("x"), with_item("x"));
        assert_ne!(with_item("x"), with_item("y"));

        let map = Value::mapping(Vec::new());
        map.as_mapping().unwrap().borrow_mut().push(("self".into(), map.clone()));
        assert_ne!(map, self_seq());
    }

    #[test]
    fn test_accessors() {
        let m = Value::mapping(vec![("n".into(), Value::from(42)), ("s".into(), "x".into())]);
        assert_eq!(m.get("n").and_then(|v| v.as_i64()), Some(42));
        assert_eq!(m.get("s").as_ref().and_then(Value::as_str), Some("x"));
        assert!(m.get("missing").is_none());
        assert_eq!(Value::from(vec![Value::Null]).get_index(0), Some(Value::Null));
    }

    #[test]
    fn test_timestamp_display() {
        let date = NaiveDate::from_ymd_opt(2001, 12, 14).unwrap();
        assert_eq!(Timestamp::Date(date).to_string(), "2001-12-14");
        let naive = date.and_hms_milli_opt(21, 59, 43, 100).unwrap();
        assert_eq!(Timestamp::Naive(naive).to_string(), "2001-12-14T21:59:43.100");
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let zoned = naive.and_local_timezone(offset).unwrap();
        assert_eq!(Timestamp::Offset(zoned).to_string(), "2001-12-14T21:59:43.100-05:00");
        let utc = naive.and_local_timezone(FixedOffset::east_opt(0).unwrap()).unwrap();
        assert_eq!(Timestamp::Offset(utc).to_string(), "2001-12-14T21:59:43.100Z");
    }
}
