//! Streaming JSON output for VPACK values.
//!
//! The dumper walks a [`Slice`] and writes its JSON rendering into a
//! [`Sink`]. Doubles print in their shortest round-trip form; types without
//! a JSON equivalent follow the configured
//! [`UnsupportedTypeBehavior`]. The VJSON flavor renders String, Binary and
//! UTCDate values with their `s:`/`b:`/`d:` prefixes so its output re-parses
//! under the VJSON parser.

use base64::Engine;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::options::{Flavor, Options, UnsupportedTypeBehavior};
use crate::slice::{ArrayIterator, ObjectIterator, Slice};
use crate::tag::ValueType;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Byte-oriented output target for the dumper.
pub trait Sink {
    fn reserve(&mut self, n: usize);
    fn push_byte(&mut self, byte: u8);
    fn append(&mut self, bytes: &[u8]);
}

impl Sink for Vec<u8> {
    fn reserve(&mut self, n: usize) {
        Vec::reserve(self, n);
    }

    fn push_byte(&mut self, byte: u8) {
        self.push(byte);
    }

    fn append(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Dumps VPACK values into a JSON output sink.
pub struct Dumper<'d, S: Sink> {
    sink: &'d mut S,
    options: &'d Options,
    flavor: Flavor,
    indentation: usize,
}

impl<'d, S: Sink> Dumper<'d, S> {
    /// A dumper producing plain JSON.
    pub fn new(sink: &'d mut S, options: &'d Options) -> Self {
        Dumper::with_flavor(sink, options, Flavor::Json)
    }

    pub fn with_flavor(sink: &'d mut S, options: &'d Options, flavor: Flavor) -> Self {
        Dumper {
            sink,
            options,
            flavor,
            indentation: 0,
        }
    }

    /// Dump a complete value.
    pub fn dump(&mut self, slice: &Slice<'_>) -> Result<()> {
        self.indentation = 0;
        self.sink.reserve(slice.byte_size()?);
        self.dump_value(slice)
    }

    /// Dump a value without resetting indentation (for embedding).
    pub fn append(&mut self, slice: &Slice<'_>) -> Result<()> {
        self.dump_value(slice)
    }

    /// Write a quoted, escaped JSON string.
    pub fn append_string(&mut self, text: &str) {
        self.sink.reserve(2 + text.len());
        self.sink.push_byte(b'"');
        self.dump_string(text.as_bytes());
        self.sink.push_byte(b'"');
    }

    /// Write an unsigned integer in decimal.
    pub fn append_uint(&mut self, value: u64) {
        let mut buffer = itoa::Buffer::new();
        self.sink.append(buffer.format(value).as_bytes());
    }

    /// Write a signed integer in decimal.
    pub fn append_int(&mut self, value: i64) {
        let mut buffer = itoa::Buffer::new();
        self.sink.append(buffer.format(value).as_bytes());
    }

    /// Write a double in its shortest form that parses back identically.
    pub fn append_double(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::NoJsonEquivalent);
        }
        let mut buffer = ryu::Buffer::new();
        self.sink.append(buffer.format_finite(value).as_bytes());
        Ok(())
    }

    fn dump_value(&mut self, slice: &Slice<'_>) -> Result<()> {
        match slice.value_type() {
            ValueType::Null => {
                self.sink.append(b"null");
                Ok(())
            }
            ValueType::Bool => {
                if slice.get_bool()? {
                    self.sink.append(b"true");
                } else {
                    self.sink.append(b"false");
                }
                Ok(())
            }
            ValueType::Array => self.dump_array(slice),
            ValueType::Object => self.dump_object(slice),
            ValueType::Double => {
                let value = slice.get_double()?;
                if value.is_finite() {
                    self.append_double(value)
                } else {
                    self.handle_unsupported(slice)
                }
            }
            ValueType::Int | ValueType::SmallInt => {
                self.append_int(slice.get_int()?);
                Ok(())
            }
            ValueType::UInt => {
                self.append_uint(slice.get_uint()?);
                Ok(())
            }
            ValueType::String => {
                let bytes = slice.get_string()?;
                self.sink.reserve(4 + bytes.len());
                self.sink.push_byte(b'"');
                if self.flavor == Flavor::VJson {
                    self.sink.append(b"s:");
                }
                self.dump_string(bytes);
                self.sink.push_byte(b'"');
                Ok(())
            }
            ValueType::Binary if self.flavor == Flavor::VJson => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(slice.get_binary()?);
                self.sink.reserve(4 + encoded.len());
                self.sink.push_byte(b'"');
                self.sink.append(b"b:");
                self.sink.append(encoded.as_bytes());
                self.sink.push_byte(b'"');
                Ok(())
            }
            ValueType::UtcDate if self.flavor == Flavor::VJson => {
                let millis = slice.get_utc_date()?;
                let timestamp =
                    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                        .map_err(|_| Error::NumberOutOfRange)?;
                let text = timestamp
                    .format(&Rfc3339)
                    .map_err(|_| Error::Internal("date formatting failed"))?;
                self.sink.push_byte(b'"');
                self.sink.append(b"d:");
                self.sink.append(text.as_bytes());
                self.sink.push_byte(b'"');
                Ok(())
            }
            _ => self.handle_unsupported(slice),
        }
    }

    fn dump_array(&mut self, slice: &Slice<'_>) -> Result<()> {
        let length = slice.length()?;
        if length == 0 {
            self.sink.append(b"[]");
            return Ok(());
        }
        if self.options.pretty_print {
            self.sink.append(b"[\n");
            self.indentation += 1;
            for (i, item) in ArrayIterator::new(*slice)?.enumerate() {
                self.indent();
                self.dump_value(&item?)?;
                if i + 1 < length {
                    self.sink.push_byte(b',');
                }
                self.sink.push_byte(b'\n');
            }
            self.indentation -= 1;
            self.indent();
            self.sink.push_byte(b']');
        } else {
            self.sink.push_byte(b'[');
            for (i, item) in ArrayIterator::new(*slice)?.enumerate() {
                if i > 0 {
                    self.sink.push_byte(b',');
                }
                self.dump_value(&item?)?;
            }
            self.sink.push_byte(b']');
        }
        Ok(())
    }

    fn dump_object(&mut self, slice: &Slice<'_>) -> Result<()> {
        let length = slice.length()?;
        if length == 0 {
            self.sink.append(b"{}");
            return Ok(());
        }
        let pretty = self.options.pretty_print;
        if pretty {
            self.sink.append(b"{\n");
            self.indentation += 1;
        } else {
            self.sink.push_byte(b'{');
        }
        for (i, pair) in ObjectIterator::new(*slice)?.enumerate() {
            let (key, value) = pair?;
            if pretty {
                self.indent();
            }
            let name = key.key_name(self.options)?;
            self.sink.push_byte(b'"');
            self.dump_string(name);
            self.sink.push_byte(b'"');
            if pretty {
                self.sink.append(b" : ");
            } else {
                self.sink.push_byte(b':');
            }
            self.dump_value(&value)?;
            if pretty {
                if i + 1 < length {
                    self.sink.push_byte(b',');
                }
                self.sink.push_byte(b'\n');
            } else if i + 1 < length {
                self.sink.push_byte(b',');
            }
        }
        if pretty {
            self.indentation -= 1;
            self.indent();
        }
        self.sink.push_byte(b'}');
        Ok(())
    }

    fn dump_string(&mut self, bytes: &[u8]) {
        self.sink.reserve(bytes.len());
        for &b in bytes {
            match b {
                b'"' => self.sink.append(b"\\\""),
                b'\\' => self.sink.append(b"\\\\"),
                0x08 => self.sink.append(b"\\b"),
                0x0c => self.sink.append(b"\\f"),
                0x0a => self.sink.append(b"\\n"),
                0x0d => self.sink.append(b"\\r"),
                0x09 => self.sink.append(b"\\t"),
                b'/' if self.options.escape_forward_slashes => self.sink.append(b"\\/"),
                _ if b < 0x20 => {
                    self.sink.append(b"\\u00");
                    self.sink.push_byte(HEX_DIGITS[(b >> 4) as usize]);
                    self.sink.push_byte(HEX_DIGITS[(b & 0x0f) as usize]);
                }
                _ => self.sink.push_byte(b),
            }
        }
    }

    fn indent(&mut self) {
        self.sink.reserve(2 * self.indentation);
        for _ in 0..self.indentation {
            self.sink.append(b"  ");
        }
    }

    fn handle_unsupported(&mut self, slice: &Slice<'_>) -> Result<()> {
        match self.options.unsupported_type_behavior {
            UnsupportedTypeBehavior::NullifyUnsupportedType => {
                self.sink.append(b"null");
                Ok(())
            }
            UnsupportedTypeBehavior::ConvertUnsupportedType => {
                self.sink.push_byte(b'"');
                self.sink.append(b"(non-representable type ");
                self.sink.append(slice.type_name().as_bytes());
                self.sink.push_byte(b')');
                self.sink.push_byte(b'"');
                Ok(())
            }
            UnsupportedTypeBehavior::FailOnUnsupportedType => Err(Error::NoJsonEquivalent),
        }
    }
}

impl Slice<'_> {
    /// Render this value as a JSON string.
    pub fn to_json(&self, options: &Options) -> Result<String> {
        let mut out = Vec::new();
        Dumper::new(&mut out, options).dump(self)?;
        String::from_utf8(out).map_err(|_| Error::InvalidUtf8Sequence)
    }

    /// Render this value as pretty-printed JSON.
    pub fn to_string_pretty(&self, options: &Options) -> Result<String> {
        let mut pretty = options.clone();
        pretty.pretty_print = true;
        self.to_json(&pretty)
    }
}
