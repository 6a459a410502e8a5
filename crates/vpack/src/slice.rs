//! Zero-copy views over VPACK values.
//!
//! A [`Slice`] is a non-owning window onto a byte buffer whose first byte is
//! a VPACK head byte. It reads type, length and contents directly from the
//! underlying bytes on demand, without allocation. All reads are bounds
//! checked against the borrowed buffer; a structurally truncated value
//! reports [`Error::TruncatedValue`].

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::hash::{fast_mod32, fasthash64, fasthash64x3};
use crate::options::Options;
use crate::seeds::SEED_TABLE;
use crate::tag::{self, ValueType};

static NONE_BYTES: [u8; 1] = [0x00];

/// A non-owning view over a single VPACK value.
///
/// The wrapped byte slice starts at the value's head byte and extends at
/// least to the end of the value (trailing bytes belonging to the enclosing
/// buffer are allowed and ignored). Copying a `Slice` never copies value
/// bytes.
#[derive(Clone, Copy)]
pub struct Slice<'a> {
    data: &'a [u8],
}

impl<'a> Slice<'a> {
    /// Create a view over a buffer whose first byte is a value head.
    ///
    /// # Errors
    ///
    /// Returns `Error::TruncatedValue` for an empty buffer.
    #[inline]
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::TruncatedValue);
        }
        Ok(Slice { data })
    }

    /// The `None` slice: a value of type [`ValueType::None`], used as the
    /// not-found result of object lookup.
    #[inline]
    #[must_use]
    pub fn none() -> Slice<'static> {
        Slice { data: &NONE_BYTES }
    }

    /// Get the underlying bytes, starting at the head byte. May extend past
    /// the end of this value; see [`Slice::value_bytes`] for the exact range.
    #[inline]
    #[must_use]
    pub fn start(&self) -> &'a [u8] {
        self.data
    }

    /// Get the head byte.
    #[inline]
    #[must_use]
    pub fn head(&self) -> u8 {
        self.data[0]
    }

    /// Get the value type encoded in the head byte.
    #[inline]
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        ValueType::from_head(self.head())
    }

    /// Get the type name (for error messages and conversion output).
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    // --- predicates ---

    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.value_type() == ValueType::None
    }

    #[inline]
    #[must_use]
    pub fn is_illegal(&self) -> bool {
        self.value_type() == ValueType::Illegal
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value_type() == ValueType::Null
    }

    #[inline]
    #[must_use]
    pub fn is_bool(&self) -> bool {
        self.value_type() == ValueType::Bool
    }

    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.value_type() == ValueType::Array
    }

    #[inline]
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.value_type() == ValueType::Object
    }

    #[inline]
    #[must_use]
    pub fn is_double(&self) -> bool {
        self.value_type() == ValueType::Double
    }

    #[inline]
    #[must_use]
    pub fn is_utc_date(&self) -> bool {
        self.value_type() == ValueType::UtcDate
    }

    #[inline]
    #[must_use]
    pub fn is_int(&self) -> bool {
        self.value_type() == ValueType::Int
    }

    #[inline]
    #[must_use]
    pub fn is_uint(&self) -> bool {
        self.value_type() == ValueType::UInt
    }

    #[inline]
    #[must_use]
    pub fn is_small_int(&self) -> bool {
        self.value_type() == ValueType::SmallInt
    }

    #[inline]
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self.value_type(),
            ValueType::Int | ValueType::UInt | ValueType::SmallInt
        )
    }

    #[inline]
    #[must_use]
    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_double()
    }

    #[inline]
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.value_type() == ValueType::String
    }

    #[inline]
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.value_type() == ValueType::Binary
    }

    // --- bounds-checked raw reads ---

    fn byte_at(&self, offset: usize) -> Result<u8> {
        self.data.get(offset).copied().ok_or(Error::TruncatedValue)
    }

    fn read_uint_at(&self, offset: usize, width: usize) -> Result<u64> {
        let end = offset.checked_add(width).ok_or(Error::TruncatedValue)?;
        let bytes = self.data.get(offset..end).ok_or(Error::TruncatedValue)?;
        tag::read_uint_le(bytes).ok_or(Error::TruncatedValue)
    }

    /// View the value starting at `offset` within this value's buffer.
    pub(crate) fn value_at_offset(&self, offset: usize) -> Result<Slice<'a>> {
        Slice::new(self.data.get(offset..).ok_or(Error::TruncatedValue)?)
    }

    // --- size and structure ---

    /// Total number of bytes this value occupies.
    pub fn byte_size(&self) -> Result<usize> {
        let h = self.head();
        match h {
            0x00 | 0x01 | 0x0a | 0x17..=0x1a | 0x1e | 0x1f | 0x30..=0x3f => Ok(1),
            0x02..=0x09 | 0x0b..=0x0e => {
                let w = tag::width_of_length_field(h);
                self.checked_len(self.read_uint_at(1, w)?)
            }
            0x13 | 0x14 => {
                let rest = self.data.get(1..).ok_or(Error::TruncatedValue)?;
                let (len, _) = tag::read_varint_forward(rest).ok_or(Error::TruncatedValue)?;
                self.checked_len(len)
            }
            0x1b..=0x1d => Ok(9),
            0x20..=0x27 => Ok(1 + (h - 0x1f) as usize),
            0x28..=0x2f => Ok(1 + (h - 0x27) as usize),
            0x40..=0xbe => Ok(1 + (h - 0x40) as usize),
            0xbf => {
                let len = self.read_uint_at(1, 8)?;
                self.checked_len(len.checked_add(9).ok_or(Error::TruncatedValue)?)
            }
            0xc0..=0xc7 => self.length_prefixed_size((h - 0xbf) as usize),
            0xc8..=0xcf => self.length_prefixed_size((h - 0xc7) as usize),
            0xd0..=0xd7 => self.length_prefixed_size((h - 0xcf) as usize),
            0xf0 => Ok(2),
            0xf1 => Ok(3),
            0xf2 => Ok(5),
            0xf3 => Ok(9),
            0xf4..=0xf6 => self.length_prefixed_size(1),
            0xf7..=0xf9 => self.length_prefixed_size(2),
            0xfa..=0xfc => self.length_prefixed_size(4),
            0xfd..=0xff => self.length_prefixed_size(8),
            _ => Err(Error::InvalidValueType("reserved head byte")),
        }
    }

    fn length_prefixed_size(&self, width: usize) -> Result<usize> {
        let payload = self.read_uint_at(1, width)?;
        let total = payload
            .checked_add(1 + width as u64)
            .ok_or(Error::TruncatedValue)?;
        self.checked_len(total)
    }

    fn checked_len(&self, len: u64) -> Result<usize> {
        let len = usize::try_from(len).map_err(|_| Error::TruncatedValue)?;
        if len == 0 {
            return Err(Error::TruncatedValue);
        }
        Ok(len)
    }

    /// Get exactly the bytes of this value.
    pub fn value_bytes(&self) -> Result<&'a [u8]> {
        let size = self.byte_size()?;
        self.data.get(..size).ok_or(Error::TruncatedValue)
    }

    /// Number of elements of an Array, or key/value pairs of an Object.
    pub fn length(&self) -> Result<usize> {
        let h = self.head();
        match h {
            0x01 | 0x0a => Ok(0),
            0x02..=0x05 => {
                let end = self.byte_size()?;
                let first = tag::first_sub_offset(h);
                let elem = self.value_at_offset(first)?.byte_size()?;
                if elem == 0 || first > end {
                    return Err(Error::TruncatedValue);
                }
                Ok((end - first) / elem)
            }
            0x06..=0x09 => {
                let w = tag::width_of_length_field(h);
                let n = if w < 8 {
                    self.read_uint_at(1 + w, w)?
                } else {
                    let end = self.byte_size()?;
                    self.read_uint_at(end.checked_sub(8).ok_or(Error::TruncatedValue)?, 8)?
                };
                usize::try_from(n).map_err(|_| Error::TruncatedValue)
            }
            0x0b..=0x0e => {
                let w = tag::width_of_length_field(h);
                let n = if w < 4 {
                    self.read_uint_at(1 + w, w)?
                } else {
                    let end = self.byte_size()?;
                    let at = end.checked_sub(1 + 2 * w).ok_or(Error::TruncatedValue)?;
                    self.read_uint_at(at, w)?
                };
                usize::try_from(n).map_err(|_| Error::TruncatedValue)
            }
            0x13 | 0x14 => {
                let bytes = self.value_bytes()?;
                let (n, _) =
                    tag::read_varint_backward(bytes, bytes.len()).ok_or(Error::TruncatedValue)?;
                usize::try_from(n).map_err(|_| Error::TruncatedValue)
            }
            _ => Err(Error::InvalidValueType("expecting array or object")),
        }
    }

    /// Byte offset of the n-th element of an Array.
    fn nth_offset(&self, index: usize) -> Result<usize> {
        let h = self.head();
        if h == 0x13 {
            return self.nth_offset_from_compact(index);
        }
        if h == 0x01 {
            return Err(Error::IndexOutOfBounds { index, length: 0 });
        }

        let w = tag::width_of_length_field(h);
        let end = self.byte_size()?;
        let first = tag::first_sub_offset(h);

        if h <= 0x05 {
            // no index table, all elements share one byte size
            let elem = self.value_at_offset(first)?.byte_size()?;
            if elem == 0 || first > end {
                return Err(Error::TruncatedValue);
            }
            let n = (end - first) / elem;
            if index >= n {
                return Err(Error::IndexOutOfBounds { index, length: n });
            }
            return Ok(first + index * elem);
        }

        let n = self.length()?;
        if index >= n {
            return Err(Error::IndexOutOfBounds { index, length: n });
        }
        if n == 1 {
            // single element, emitted without an index table
            return Ok(first);
        }
        let table = n.checked_mul(w).ok_or(Error::TruncatedValue)?;
        let ie_base = if w < 8 {
            end.checked_sub(table).ok_or(Error::TruncatedValue)?
        } else {
            end.checked_sub(table + 8).ok_or(Error::TruncatedValue)?
        };
        let offset = self.read_uint_at(ie_base + index * w, w)?;
        usize::try_from(offset).map_err(|_| Error::TruncatedValue)
    }

    fn nth_offset_from_compact(&self, index: usize) -> Result<usize> {
        let n = self.length()?;
        if index >= n {
            return Err(Error::IndexOutOfBounds { index, length: n });
        }
        let rest = self.data.get(1..).ok_or(Error::TruncatedValue)?;
        let (_, header) = tag::read_varint_forward(rest).ok_or(Error::TruncatedValue)?;
        let mut offset = 1 + header;
        for _ in 0..index {
            offset += self.value_at_offset(offset)?.byte_size()?;
        }
        Ok(offset)
    }

    /// Get the n-th element of an Array.
    ///
    /// O(1) for all layouts except compact arrays, which are walked.
    pub fn get_nth(&self, index: usize) -> Result<Slice<'a>> {
        if !self.is_array() {
            return Err(Error::InvalidValueType("expecting array"));
        }
        let offset = self.nth_offset(index)?;
        self.value_at_offset(offset)
    }

    /// Get the raw n-th key of an Object, in stored order. The result is a
    /// String, or a UInt/SmallInt for translated keys.
    pub fn get_nth_key(&self, index: usize) -> Result<Slice<'a>> {
        Ok(self.nth_pair(index)?.0)
    }

    /// Get the n-th value of an Object, in stored order.
    pub fn get_nth_value(&self, index: usize) -> Result<Slice<'a>> {
        Ok(self.nth_pair(index)?.1)
    }

    fn nth_pair(&self, index: usize) -> Result<(Slice<'a>, Slice<'a>)> {
        let mut it = ObjectIterator::new(*self)?;
        let length = it.remaining;
        match it.nth(index) {
            Some(pair) => pair,
            None => Err(Error::IndexOutOfBounds { index, length }),
        }
    }

    /// Look up an attribute inside an Object without a translator.
    ///
    /// Returns the `None` slice when the attribute is not present.
    pub fn get(&self, attribute: &str) -> Result<Slice<'a>> {
        self.get_with(attribute, &Options::default())
    }

    /// Look up an attribute inside an Object.
    ///
    /// Indexed objects resolve the attribute through the cuckoo hash table
    /// stored in the value: three candidate slots are derived from the
    /// stored seed byte, and each non-empty candidate is compared against
    /// `attribute`. Compact objects are scanned linearly.
    pub fn get_with(&self, attribute: &str, options: &Options) -> Result<Slice<'a>> {
        if !self.is_object() {
            return Err(Error::InvalidValueType("expecting object"));
        }
        let h = self.head();
        if h == 0x0a {
            return Ok(Slice::none());
        }
        if h == 0x14 {
            return self.get_from_compact_object(attribute, options);
        }

        let w = tag::width_of_length_field(h);
        let end = self.byte_size()?;
        let (n_slots, ht_base, seed) = if w < 4 {
            let n_slots = usize::try_from(self.read_uint_at(1 + 2 * w, w)?)
                .map_err(|_| Error::TruncatedValue)?;
            let table = n_slots.checked_mul(w).ok_or(Error::TruncatedValue)?;
            let ht_base = end.checked_sub(table).ok_or(Error::TruncatedValue)?;
            (n_slots, ht_base, self.byte_at(1 + 3 * w)?)
        } else {
            let at = end.checked_sub(1 + w).ok_or(Error::TruncatedValue)?;
            let n_slots =
                usize::try_from(self.read_uint_at(at, w)?).map_err(|_| Error::TruncatedValue)?;
            let table = n_slots.checked_mul(w).ok_or(Error::TruncatedValue)?;
            let ht_base = end
                .checked_sub(table + 1 + 2 * w)
                .ok_or(Error::TruncatedValue)?;
            (n_slots, ht_base, self.byte_at(end - 1)?)
        };
        if n_slots == 0 {
            return Err(Error::TruncatedValue);
        }

        let small = n_slots <= 0x0100_0000;
        let seeds_at = 3 * seed as usize;
        let seeds = [
            SEED_TABLE[seeds_at],
            SEED_TABLE[seeds_at + 1],
            SEED_TABLE[seeds_at + 2],
        ];
        let hashes = fasthash64x3(attribute.as_bytes(), &seeds);

        for hash in hashes {
            let pos = if small {
                fast_mod32(hash, n_slots as u64) as usize
            } else {
                (hash % n_slots as u64) as usize
            };
            let offset = self.read_uint_at(ht_base + pos * w, w)?;
            if offset == 0 {
                continue;
            }
            let offset = usize::try_from(offset).map_err(|_| Error::TruncatedValue)?;
            let key = self.value_at_offset(offset)?;
            if key.key_name(options)? == attribute.as_bytes() {
                return self.value_at_offset(offset + key.byte_size()?);
            }
        }
        Ok(Slice::none())
    }

    fn get_from_compact_object(&self, attribute: &str, options: &Options) -> Result<Slice<'a>> {
        for pair in ObjectIterator::new(*self)? {
            let (key, value) = pair?;
            if key.key_name(options)? == attribute.as_bytes() {
                return Ok(value);
            }
        }
        Ok(Slice::none())
    }

    /// Resolve this object key to its attribute name bytes.
    ///
    /// Strings resolve to their own contents; UInt/SmallInt keys go through
    /// the configured attribute translator.
    pub fn key_name<'s>(&'s self, options: &'s Options) -> Result<&'s [u8]> {
        if self.is_string() {
            return self.get_string();
        }
        if self.is_small_int() || self.is_uint() {
            let translator = options
                .attribute_translator
                .as_deref()
                .ok_or(Error::NeedAttributeTranslator)?;
            return translator
                .translate_id(self.get_uint_unchecked())
                .ok_or(Error::NeedAttributeTranslator);
        }
        Err(Error::InvalidValueType("cannot translate key of this type"))
    }

    // --- scalar getters ---

    /// Get a Bool value.
    pub fn get_bool(&self) -> Result<bool> {
        match self.head() {
            0x19 => Ok(false),
            0x1a => Ok(true),
            _ => Err(Error::InvalidValueType("expecting bool")),
        }
    }

    /// Get a Double value.
    pub fn get_double(&self) -> Result<f64> {
        if self.head() != 0x1b {
            return Err(Error::InvalidValueType("expecting double"));
        }
        Ok(f64::from_bits(self.read_uint_at(1, 8)?))
    }

    /// Get a UTCDate value as milliseconds since the epoch.
    pub fn get_utc_date(&self) -> Result<i64> {
        if self.head() != 0x1c {
            return Err(Error::InvalidValueType("expecting utc-date"));
        }
        Ok(self.read_uint_at(1, 8)? as i64)
    }

    /// Get the value of an Int (also accepts UInt and SmallInt in range).
    pub fn get_int(&self) -> Result<i64> {
        let h = self.head();
        if (0x20..=0x27).contains(&h) {
            let width = (h - 0x1f) as usize;
            let v = self.read_uint_at(1, width)?;
            return Ok(tag::sign_extend(v, width));
        }
        if (0x28..=0x2f).contains(&h) {
            let v = self.read_uint_at(1, (h - 0x27) as usize)?;
            if v > i64::MAX as u64 {
                return Err(Error::NumberOutOfRange);
            }
            return Ok(v as i64);
        }
        if (0x30..=0x3f).contains(&h) {
            return self.get_small_int();
        }
        Err(Error::InvalidValueType("expecting type int"))
    }

    /// Get the value of a UInt (also accepts Int and SmallInt in range).
    pub fn get_uint(&self) -> Result<u64> {
        let h = self.head();
        if (0x28..=0x2f).contains(&h) {
            return self.read_uint_at(1, (h - 0x27) as usize);
        }
        if (0x20..=0x27).contains(&h) {
            let v = self.get_int()?;
            if v < 0 {
                return Err(Error::NumberOutOfRange);
            }
            return Ok(v as u64);
        }
        if (0x30..=0x39).contains(&h) {
            return Ok(u64::from(h - 0x30));
        }
        if (0x3a..=0x3f).contains(&h) {
            return Err(Error::NumberOutOfRange);
        }
        Err(Error::InvalidValueType("expecting type uint"))
    }

    /// Get the value of a SmallInt (also accepts Int and UInt in range).
    pub fn get_small_int(&self) -> Result<i64> {
        let h = self.head();
        if (0x30..=0x39).contains(&h) {
            return Ok(i64::from(h - 0x30));
        }
        if (0x3a..=0x3f).contains(&h) {
            return Ok(i64::from(h - 0x3a) - 6);
        }
        if (0x20..=0x2f).contains(&h) {
            return self.get_int();
        }
        Err(Error::InvalidValueType("expecting type smallint"))
    }

    /// The value of a UInt or non-negative SmallInt, without type checks.
    /// Returns 0 for every other head.
    #[must_use]
    pub(crate) fn get_uint_unchecked(&self) -> u64 {
        let h = self.head();
        if (0x28..=0x2f).contains(&h) {
            return self.read_uint_at(1, (h - 0x27) as usize).unwrap_or(0);
        }
        if (0x30..=0x39).contains(&h) {
            return u64::from(h - 0x30);
        }
        0
    }

    /// Get a numeric value converted to `T`, with range checks.
    pub fn get_numeric_value<T: NumericValue>(&self) -> Result<T> {
        T::from_slice(self)
    }

    /// Get the bytes of a String value.
    pub fn get_string(&self) -> Result<&'a [u8]> {
        let h = self.head();
        if (0x40..=0xbe).contains(&h) {
            let len = (h - 0x40) as usize;
            return self.data.get(1..1 + len).ok_or(Error::TruncatedValue);
        }
        if h == 0xbf {
            let len =
                usize::try_from(self.read_uint_at(1, 8)?).map_err(|_| Error::TruncatedValue)?;
            return self.data.get(9..9 + len).ok_or(Error::TruncatedValue);
        }
        Err(Error::InvalidValueType("expecting string"))
    }

    /// Get a String value as `&str`, validating UTF-8.
    pub fn get_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.get_string()?).map_err(|_| Error::InvalidUtf8Sequence)
    }

    /// Get the payload bytes of a Binary value.
    pub fn get_binary(&self) -> Result<&'a [u8]> {
        let h = self.head();
        if !(0xc0..=0xc7).contains(&h) {
            return Err(Error::InvalidValueType("expecting binary"));
        }
        let w = (h - 0xbf) as usize;
        let len = usize::try_from(self.read_uint_at(1, w)?).map_err(|_| Error::TruncatedValue)?;
        self.data.get(1 + w..1 + w + len).ok_or(Error::TruncatedValue)
    }

    // --- hashing and comparison ---

    /// Hash the raw bytes of this value.
    pub fn hash(&self, seed: u64) -> Result<u64> {
        Ok(fasthash64(self.value_bytes()?, seed))
    }

    /// A canonical hash that folds numeric equivalence and ignores object
    /// entry order.
    ///
    /// Integers hash as their double upcast, so `5` and `5.0` collide by
    /// construction. Objects XOR the hashes of their keys and values under a
    /// fixed derived seed, making the result independent of slot order.
    pub fn normalized_hash(&self, seed: u64) -> Result<u64> {
        if self.is_number() {
            let v: f64 = self.get_numeric_value()?;
            return Ok(fasthash64(&v.to_le_bytes(), seed));
        }
        if self.is_array() {
            let n = (self.length()? as u64) ^ 0xba5bedf00d;
            let mut value = fasthash64(&n.to_le_bytes(), seed);
            for item in ArrayIterator::new(*self)? {
                value ^= item?.normalized_hash(value)?;
            }
            return Ok(value);
        }
        if self.is_object() {
            let n = (self.length()? as u64) ^ 0xf00ba44ba5;
            let seed2 = fasthash64(&n.to_le_bytes(), seed);
            let mut value = seed2;
            for pair in ObjectIterator::new(*self)? {
                let (key, val) = pair?;
                value ^= key.normalized_hash(seed2)?;
                value ^= val.normalized_hash(seed2)?;
            }
            return Ok(value);
        }
        self.hash(seed)
    }

    /// Check binary-level equality: same head and identical declared bytes.
    #[must_use]
    pub fn equals(&self, other: &Slice<'_>) -> bool {
        if self.head() != other.head() {
            return false;
        }
        match (self.value_bytes(), other.value_bytes()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Compare a String value against `attribute` bytewise, with length as
    /// the tie breaker.
    pub fn compare_string(&self, attribute: &str) -> Result<Ordering> {
        Ok(self.get_string()?.cmp(attribute.as_bytes()))
    }

    /// Check whether a String value equals `attribute`.
    pub fn is_equal_string(&self, attribute: &str) -> Result<bool> {
        Ok(self.get_string()? == attribute.as_bytes())
    }
}

impl std::fmt::Debug for Slice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Slice({} {:#04x}, byteSize: {:?})",
            self.type_name(),
            self.head(),
            self.byte_size()
        )
    }
}

/// Conversion target for [`Slice::get_numeric_value`].
pub trait NumericValue: Sized + sealed::Sealed {
    fn from_slice(slice: &Slice<'_>) -> Result<Self>;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i64 {}
    impl Sealed for u64 {}
    impl Sealed for f64 {}
}

impl NumericValue for i64 {
    fn from_slice(slice: &Slice<'_>) -> Result<Self> {
        if slice.is_double() {
            let v = slice.get_double()?;
            if v < i64::MIN as f64 || v > i64::MAX as f64 || v.is_nan() {
                return Err(Error::NumberOutOfRange);
            }
            return Ok(v as i64);
        }
        slice.get_int()
    }
}

impl NumericValue for u64 {
    fn from_slice(slice: &Slice<'_>) -> Result<Self> {
        if slice.is_double() {
            let v = slice.get_double()?;
            if v < 0.0 || v > u64::MAX as f64 || v.is_nan() {
                return Err(Error::NumberOutOfRange);
            }
            return Ok(v as u64);
        }
        slice.get_uint()
    }
}

impl NumericValue for f64 {
    fn from_slice(slice: &Slice<'_>) -> Result<Self> {
        match slice.value_type() {
            ValueType::Double => slice.get_double(),
            ValueType::Int | ValueType::SmallInt => Ok(slice.get_int()? as f64),
            ValueType::UInt => Ok(slice.get_uint()? as f64),
            _ => Err(Error::InvalidValueType("expecting a number")),
        }
    }
}

/// Iterator over the elements of an Array.
pub struct ArrayIterator<'a> {
    container: Slice<'a>,
    remaining: usize,
    position: usize,
    /// Byte offset of the next element for walked layouts, 0 for indexed.
    offset: usize,
    walk: bool,
}

impl<'a> ArrayIterator<'a> {
    pub fn new(container: Slice<'a>) -> Result<Self> {
        if !container.is_array() {
            return Err(Error::InvalidValueType("expecting array"));
        }
        let remaining = container.length()?;
        let h = container.head();
        let (walk, offset) = if h == 0x13 {
            let rest = container.data.get(1..).ok_or(Error::TruncatedValue)?;
            let (_, header) = tag::read_varint_forward(rest).ok_or(Error::TruncatedValue)?;
            (true, 1 + header)
        } else {
            (false, 0)
        };
        Ok(ArrayIterator {
            container,
            remaining,
            position: 0,
            offset,
            walk,
        })
    }

    fn step(&mut self) -> Result<Slice<'a>> {
        let item = if self.walk {
            let item = self.container.value_at_offset(self.offset)?;
            self.offset += item.byte_size()?;
            item
        } else {
            let offset = self.container.nth_offset(self.position)?;
            self.container.value_at_offset(offset)?
        };
        self.position += 1;
        self.remaining -= 1;
        Ok(item)
    }
}

impl<'a> Iterator for ArrayIterator<'a> {
    type Item = Result<Slice<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.step();
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Iterator over the key/value pairs of an Object, in stored order.
///
/// Indexed objects keep their pairs contiguous in the payload area; the hash
/// table at the end of the value is only consulted for lookup, never for
/// iteration.
pub struct ObjectIterator<'a> {
    container: Slice<'a>,
    remaining: usize,
    offset: usize,
}

impl<'a> ObjectIterator<'a> {
    pub fn new(container: Slice<'a>) -> Result<Self> {
        if !container.is_object() {
            return Err(Error::InvalidValueType("expecting object"));
        }
        let remaining = container.length()?;
        let h = container.head();
        let offset = if h == 0x14 {
            let rest = container.data.get(1..).ok_or(Error::TruncatedValue)?;
            let (_, header) = tag::read_varint_forward(rest).ok_or(Error::TruncatedValue)?;
            1 + header
        } else {
            tag::first_sub_offset(h)
        };
        Ok(ObjectIterator {
            container,
            remaining,
            offset,
        })
    }

    fn step(&mut self) -> Result<(Slice<'a>, Slice<'a>)> {
        let key = self.container.value_at_offset(self.offset)?;
        let key_size = key.byte_size()?;
        let value = self.container.value_at_offset(self.offset + key_size)?;
        self.offset += key_size + value.byte_size()?;
        self.remaining -= 1;
        Ok((key, value))
    }
}

impl<'a> Iterator for ObjectIterator<'a> {
    type Item = Result<(Slice<'a>, Slice<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pair = self.step();
        if pair.is_err() {
            self.remaining = 0;
        }
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        // null
        let v = Slice::new(&[0x18]).unwrap();
        assert!(v.is_null());
        assert_eq!(v.byte_size().unwrap(), 1);

        // bools
        assert_eq!(Slice::new(&[0x19]).unwrap().get_bool().unwrap(), false);
        assert_eq!(Slice::new(&[0x1a]).unwrap().get_bool().unwrap(), true);

        // double 1.5
        let mut data = vec![0x1b];
        data.extend_from_slice(&1.5f64.to_le_bytes());
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.get_double().unwrap(), 1.5);
        assert_eq!(v.byte_size().unwrap(), 9);

        // utc date
        let mut data = vec![0x1c];
        data.extend_from_slice(&(-1000i64 as u64).to_le_bytes());
        assert_eq!(Slice::new(&data).unwrap().get_utc_date().unwrap(), -1000);
    }

    #[test]
    fn test_small_ints() {
        assert_eq!(Slice::new(&[0x30]).unwrap().get_small_int().unwrap(), 0);
        assert_eq!(Slice::new(&[0x39]).unwrap().get_small_int().unwrap(), 9);
        assert_eq!(Slice::new(&[0x3a]).unwrap().get_small_int().unwrap(), -6);
        assert_eq!(Slice::new(&[0x3f]).unwrap().get_small_int().unwrap(), -1);
        assert_eq!(Slice::new(&[0x35]).unwrap().get_int().unwrap(), 5);
        assert_eq!(Slice::new(&[0x35]).unwrap().get_uint().unwrap(), 5);
        assert_eq!(
            Slice::new(&[0x3f]).unwrap().get_uint().unwrap_err(),
            Error::NumberOutOfRange
        );
    }

    #[test]
    fn test_int_sign_extension() {
        // -1 as a 1-byte Int
        let v = Slice::new(&[0x20, 0xff]).unwrap();
        assert_eq!(v.get_int().unwrap(), -1);

        // i64::MIN as an 8-byte Int
        let mut data = vec![0x27];
        data.extend_from_slice(&(i64::MIN as u64).to_le_bytes());
        assert_eq!(Slice::new(&data).unwrap().get_int().unwrap(), i64::MIN);

        // u64::MAX as an 8-byte UInt does not fit an i64
        let mut data = vec![0x2f];
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.get_uint().unwrap(), u64::MAX);
        assert_eq!(v.get_int().unwrap_err(), Error::NumberOutOfRange);
    }

    #[test]
    fn test_strings() {
        // short string "hi"
        let v = Slice::new(&[0x42, b'h', b'i']).unwrap();
        assert_eq!(v.get_str().unwrap(), "hi");
        assert_eq!(v.byte_size().unwrap(), 3);

        // empty string
        let v = Slice::new(&[0x40]).unwrap();
        assert_eq!(v.get_string().unwrap(), b"");

        // long string
        let payload = vec![b'x'; 200];
        let mut data = vec![0xbf];
        data.extend_from_slice(&200u64.to_le_bytes());
        data.extend_from_slice(&payload);
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.get_string().unwrap(), &payload[..]);
        assert_eq!(v.byte_size().unwrap(), 209);

        // truncated long string
        let v = Slice::new(&data[..50]).unwrap();
        assert_eq!(v.get_string().unwrap_err(), Error::TruncatedValue);
    }

    #[test]
    fn test_binary() {
        let v = Slice::new(&[0xc0, 0x03, 0xaa, 0xbb, 0xcc]).unwrap();
        assert_eq!(v.get_binary().unwrap(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(v.byte_size().unwrap(), 5);
    }

    #[test]
    fn test_unindexed_array() {
        // [1, 2, 3] as smallints in an 0x02 array: 2 + 3 = 5 bytes
        let data = [0x02, 0x05, 0x31, 0x32, 0x33];
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.length().unwrap(), 3);
        assert_eq!(v.get_nth(0).unwrap().get_int().unwrap(), 1);
        assert_eq!(v.get_nth(2).unwrap().get_int().unwrap(), 3);
        assert!(matches!(
            v.get_nth(3).unwrap_err(),
            Error::IndexOutOfBounds { index: 3, length: 3 }
        ));
    }

    #[test]
    fn test_compact_array() {
        // compact [1, 16]: head, byteLen=6, payload 0x31 0x28 0x10, nitems=2
        let data = [0x13, 0x06, 0x31, 0x28, 0x10, 0x02];
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.byte_size().unwrap(), 6);
        assert_eq!(v.length().unwrap(), 2);
        assert_eq!(v.get_nth(0).unwrap().get_int().unwrap(), 1);
        assert_eq!(v.get_nth(1).unwrap().get_uint().unwrap(), 16);
    }

    #[test]
    fn test_compact_object_lookup() {
        // compact {"a": 1}: head, byteLen=6, "a" 0x41 0x61, 0x31, nitems=1
        let data = [0x14, 0x06, 0x41, 0x61, 0x31, 0x01];
        let v = Slice::new(&data).unwrap();
        assert_eq!(v.length().unwrap(), 1);
        assert_eq!(v.get("a").unwrap().get_int().unwrap(), 1);
        assert!(v.get("b").unwrap().is_none());
        let key = v.get_nth_key(0).unwrap();
        assert_eq!(key.get_str().unwrap(), "a");
    }

    #[test]
    fn test_empty_containers() {
        let arr = Slice::new(&[0x01]).unwrap();
        assert_eq!(arr.length().unwrap(), 0);
        let obj = Slice::new(&[0x0a]).unwrap();
        assert_eq!(obj.length().unwrap(), 0);
        assert!(obj.get("x").unwrap().is_none());
    }

    #[test]
    fn test_equals() {
        let a = Slice::new(&[0x42, b'h', b'i']).unwrap();
        let b = Slice::new(&[0x42, b'h', b'i', 0xff]).unwrap(); // trailing garbage
        let c = Slice::new(&[0x42, b'h', b'o']).unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
        assert!(!a.equals(&Slice::new(&[0x18]).unwrap()));
    }

    #[test]
    fn test_numeric_value() {
        let five = Slice::new(&[0x35]).unwrap();
        assert_eq!(five.get_numeric_value::<f64>().unwrap(), 5.0);
        assert_eq!(five.get_numeric_value::<i64>().unwrap(), 5);
        assert_eq!(five.get_numeric_value::<u64>().unwrap(), 5);

        let mut data = vec![0x1b];
        data.extend_from_slice(&(-2.0f64).to_le_bytes());
        let minus_two = Slice::new(&data).unwrap();
        assert_eq!(minus_two.get_numeric_value::<i64>().unwrap(), -2);
        assert_eq!(
            minus_two.get_numeric_value::<u64>().unwrap_err(),
            Error::NumberOutOfRange
        );
    }
}
