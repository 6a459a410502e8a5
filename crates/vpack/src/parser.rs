//! Single-pass JSON parser emitting VPACK directly into a Builder buffer.
//!
//! The parser never materializes a DOM: strings are copied straight into the
//! output buffer behind a provisional one-byte header (widened in place when
//! the payload outgrows the short form), and containers rely on the
//! Builder's deferred layout selection. The VJSON flavor types quoted
//! strings through `s:`/`b:`/`d:` prefixes.

use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::options::{AttributeExcludeHandler, AttributeTranslator, Flavor, Options};
use crate::scan;
use crate::slice::Slice;

/// Base64 decode table: 255 marks invalid input. Accepts both the `+/` and
/// the `-_` alphabet. Part of the VJSON contract.
const BASE64_DECODE_TABLE: [u8; 128] = [
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, //
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, //
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 62, 255, 62, 255, 63, //
    52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 255, 255, 0, 255, 255, 255, //
    255, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, //
    15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 255, 255, 255, 255, 63, //
    255, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, //
    41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 255, 255, 255, 255, 255, //
];

#[inline]
fn decode_b64(byte: u8) -> u8 {
    if byte <= b'z' {
        BASE64_DECODE_TABLE[byte as usize]
    } else {
        0xff
    }
}

#[inline]
fn is_white_space(byte: u8) -> bool {
    byte == 0x20 || byte == 0x09 || byte == 0x0a || byte == 0x0d
}

/// Parses JSON (or VJSON) text into VPACK.
pub struct Parser {
    builder: Builder,
    flavor: Flavor,
}

impl Parser {
    /// A parser for plain JSON.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Parser::with_flavor(options, Flavor::Json)
    }

    #[must_use]
    pub fn with_flavor(options: Options, flavor: Flavor) -> Self {
        Parser {
            builder: Builder::with_options(options),
            flavor,
        }
    }

    /// Parse one JSON value, requiring the input to be fully consumed.
    /// Returns the number of top-level values parsed (always 1 on success).
    pub fn parse(&mut self, input: &[u8]) -> Result<usize> {
        self.parse_with(input, false)
    }

    /// Parse any number of whitespace-separated top-level JSON values.
    pub fn parse_multi(&mut self, input: &[u8]) -> Result<usize> {
        self.parse_with(input, true)
    }

    fn parse_with(&mut self, input: &[u8], multi: bool) -> Result<usize> {
        let options = self.builder.options();
        let validate_utf8 = options.validate_utf8_strings;
        let keep_top_level_open = options.keep_top_level_open;
        let exclude = options.attribute_exclude_handler.clone();
        let translator = options.attribute_translator.clone();
        let mut scan = Scan {
            input,
            pos: 0,
            nesting: 0,
            flavor: self.flavor,
            validate_utf8,
            keep_top_level_open,
            exclude,
            translator,
            b: &mut self.builder,
        };
        scan.parse_internal(multi)
    }

    #[must_use]
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }

    #[must_use]
    pub fn into_builder(self) -> Builder {
        self.builder
    }

    /// View the parsed value.
    pub fn slice(&self) -> Result<Slice<'_>> {
        self.builder.slice()
    }
}

/// Digits scanned so far: accumulates as u64 and falls back to a double once
/// the integer overflows.
struct ParsedNumber {
    int_value: u64,
    double_value: f64,
    is_integer: bool,
}

impl ParsedNumber {
    fn new() -> Self {
        ParsedNumber {
            int_value: 0,
            double_value: 0.0,
            is_integer: true,
        }
    }

    fn add_digit(&mut self, digit: u8) {
        if self.is_integer {
            if let Some(v) = self
                .int_value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
            {
                self.int_value = v;
                return;
            }
            self.double_value = self.int_value as f64;
            self.is_integer = false;
        }
        self.double_value = self.double_value * 10.0 + f64::from(digit);
    }
}

/// One parse run over a borrowed input buffer.
struct Scan<'a, 'b> {
    input: &'a [u8],
    pos: usize,
    nesting: usize,
    flavor: Flavor,
    validate_utf8: bool,
    keep_top_level_open: bool,
    exclude: Option<Arc<dyn AttributeExcludeHandler>>,
    translator: Option<Arc<dyn AttributeTranslator>>,
    b: &'b mut Builder,
}

impl Scan<'_, '_> {
    fn parse_internal(&mut self, multi: bool) -> Result<usize> {
        // skip over an optional UTF-8 BOM
        if self.input.len() >= 3 && self.input[..3] == [0xef, 0xbb, 0xbf] {
            self.pos = 3;
        }

        let mut count = 0;
        loop {
            let depth_before = self.b.open_depth();
            let reported_before = self.b.top_index_len();
            let position_before = self.b.position();
            if let Err(e) = self.parse_json() {
                // undo the speculative registration of the failed value so
                // the builder stays consistent
                if self.b.open_depth() == depth_before {
                    if self.b.top_index_len() > reported_before {
                        self.b.cleanup_add();
                    } else {
                        self.b.truncate_to(position_before);
                    }
                }
                return Err(e);
            }
            count += 1;
            while self.pos < self.input.len() && is_white_space(self.input[self.pos]) {
                self.pos += 1;
            }
            if !multi && self.pos != self.input.len() {
                return Err(Error::Parse("expecting EOF", self.pos));
            }
            if !multi || self.pos >= self.input.len() {
                return Ok(count);
            }
        }
    }

    #[inline]
    fn consume(&mut self) -> Option<u8> {
        let c = self.input.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    #[inline]
    fn get_one(&mut self, err: &'static str) -> Result<u8> {
        self.consume().ok_or(Error::Parse(err, self.pos))
    }

    /// Skip whitespace and peek at the next byte without consuming it.
    fn skip_white_space(&mut self, err: &'static str) -> Result<u8> {
        let len = self.input.len();
        if self.pos >= len {
            return Err(Error::Parse(err, self.pos));
        }
        let c = self.input[self.pos];
        if !is_white_space(c) {
            return Ok(c);
        }
        if c == b' ' {
            // single space fast path
            if self.pos + 1 >= len {
                self.pos += 1;
                return Err(Error::Parse(err, self.pos));
            }
            let c = self.input[self.pos + 1];
            if !is_white_space(c) {
                self.pos += 1;
                return Ok(c);
            }
        }
        let remaining = len - self.pos;
        if remaining >= 16 {
            self.pos += scan::json_skip_white_space(&self.input[self.pos..len - 15]);
        }
        while self.pos < len {
            if !is_white_space(self.input[self.pos]) {
                return Ok(self.input[self.pos]);
            }
            self.pos += 1;
        }
        Err(Error::Parse(err, self.pos))
    }

    fn parse_json(&mut self) -> Result<()> {
        let c = self.skip_white_space("expecting item")?;
        match c {
            b'{' => {
                self.pos += 1;
                self.parse_object()
            }
            b'[' => {
                self.pos += 1;
                self.parse_array()
            }
            b't' => {
                self.pos += 1;
                self.parse_literal(b"rue", "expecting 'true'")?;
                self.b.add_bool(true)
            }
            b'f' => {
                self.pos += 1;
                self.parse_literal(b"alse", "expecting 'false'")?;
                self.b.add_bool(false)
            }
            b'n' => {
                self.pos += 1;
                self.parse_literal(b"ull", "expecting 'null'")?;
                self.b.add_null()
            }
            b'"' => {
                self.pos += 1;
                match self.flavor {
                    Flavor::Json => self.parse_string(),
                    Flavor::VJson => self.parse_vjson_string(),
                }
            }
            _ => self.parse_number(),
        }
    }

    fn parse_literal(&mut self, rest: &'static [u8], err: &'static str) -> Result<()> {
        if self.input[self.pos..].starts_with(rest) {
            self.pos += rest.len();
            Ok(())
        } else {
            Err(Error::Parse(err, self.pos))
        }
    }

    fn parse_array(&mut self) -> Result<()> {
        self.b.add_array()?;

        let c = self.skip_white_space("expecting item or ']'")?;
        if c == b']' {
            self.pos += 1;
            if self.nesting != 0 || !self.keep_top_level_open {
                self.b.close()?;
            }
            return Ok(());
        }

        self.nesting += 1;
        loop {
            self.parse_json()?;
            let c = self.skip_white_space("expecting ',' or ']'")?;
            if c == b']' {
                self.pos += 1;
                if self.nesting != 1 || !self.keep_top_level_open {
                    self.b.close()?;
                }
                self.nesting -= 1;
                return Ok(());
            }
            if c != b',' {
                return Err(Error::Parse("expecting ',' or ']'", self.pos));
            }
            self.pos += 1;
        }
    }

    fn parse_object(&mut self) -> Result<()> {
        self.b.add_object()?;

        let mut c = self.skip_white_space("expecting item or '}'")?;
        if c == b'}' {
            self.pos += 1;
            if self.nesting != 0 || !self.keep_top_level_open {
                self.b.close()?;
            }
            return Ok(());
        }

        self.nesting += 1;
        loop {
            if c != b'"' {
                return Err(Error::Parse("expecting '\"' or '}'", self.pos));
            }
            self.pos += 1;

            let key_start = self.b.position();
            // attribute names are always plain strings, even in VJSON
            self.parse_string()?;

            let mut exclude = false;
            if let Some(handler) = self.exclude.clone() {
                let key = Slice::new(&self.b.bytes()[key_start..])?;
                exclude = handler.should_exclude(key, self.nesting);
            }

            if !exclude && self.translator.is_some() {
                let translated = {
                    let key = Slice::new(&self.b.bytes()[key_start..])?;
                    match (key.is_string(), self.translator.as_deref()) {
                        (true, Some(translator)) => translator.translate_name(key.get_string()?),
                        _ => None,
                    }
                };
                if let Some(id) = translated {
                    // overwrite the emitted key bytes with the numeric id
                    self.b.truncate_to(key_start);
                    self.b.append_uint_with_head(id, 0x27);
                }
            }

            c = self.skip_white_space("expecting ':'")?;
            if c != b':' {
                return Err(Error::Parse("expecting ':'", self.pos));
            }
            self.pos += 1;

            self.parse_json()?;

            if exclude {
                self.b.remove_last()?;
            }

            c = self.skip_white_space("expecting ',' or '}'")?;
            if c == b'}' {
                self.pos += 1;
                if self.nesting != 1 || !self.keep_top_level_open {
                    self.b.close()?;
                }
                self.nesting -= 1;
                return Ok(());
            }
            if c != b',' {
                return Err(Error::Parse("expecting ',' or '}'", self.pos));
            }
            self.pos += 1;
            c = self.skip_white_space("expecting '\"' or '}'")?;
        }
    }

    fn scan_digits(&mut self, number: &mut ParsedNumber) {
        while let Some(&c) = self.input.get(self.pos) {
            if !c.is_ascii_digit() {
                return;
            }
            number.add_digit(c - b'0');
            self.pos += 1;
        }
    }

    fn parse_number(&mut self) -> Result<()> {
        let start_pos = self.pos;
        let mut number = ParsedNumber::new();
        let mut negative = false;

        let mut c = self.get_one("incomplete number")?;
        if c == b'-' {
            c = self.get_one("incomplete number")?;
            negative = true;
        }
        if !c.is_ascii_digit() {
            return Err(Error::Parse("expecting digit", self.pos));
        }
        if c != b'0' {
            // re-scan from the first digit
            self.pos -= 1;
            self.scan_digits(&mut number);
        }

        let next = self.consume();
        if !matches!(next, Some(b'.') | Some(b'e') | Some(b'E')) {
            if next.is_some() {
                self.pos -= 1;
            }
            if !number.is_integer {
                let v = number.double_value;
                return self.b.add_double(if negative { -v } else { v });
            }
            if negative {
                if number.int_value <= i64::MAX as u64 {
                    return self.b.add_int(-(number.int_value as i64));
                }
                if number.int_value == i64::MIN as u64 {
                    return self.b.add_int(i64::MIN);
                }
                return self.b.add_double(-(number.int_value as f64));
            }
            return self.b.add_uint(number.int_value);
        }

        // fractional part and/or exponent: validate the grammar here, then
        // convert the original substring in one go to avoid the precision
        // loss of multiplying up scanned digits
        let mut next = next;
        if next == Some(b'.') {
            let d = self.get_one("incomplete number")?;
            if !d.is_ascii_digit() {
                return Err(Error::Parse("incomplete number", self.pos));
            }
            self.pos -= 1;
            let mut fraction = ParsedNumber::new();
            self.scan_digits(&mut fraction);
            next = self.consume();
        }
        match next {
            Some(b'e') | Some(b'E') => {
                let mut d = self.get_one("incomplete number")?;
                if d == b'+' || d == b'-' {
                    d = self.get_one("incomplete number")?;
                }
                if !d.is_ascii_digit() {
                    return Err(Error::Parse("incomplete number", self.pos));
                }
                self.pos -= 1;
                let mut exponent = ParsedNumber::new();
                self.scan_digits(&mut exponent);
            }
            Some(_) => self.pos -= 1,
            None => {}
        }

        let text = std::str::from_utf8(&self.input[start_pos..self.pos])
            .map_err(|_| Error::Parse("incomplete number", self.pos))?;
        let value: f64 = text
            .parse()
            .map_err(|_| Error::Parse("incomplete number", self.pos))?;
        if !value.is_finite() {
            return Err(Error::NumberOutOfRange);
        }
        self.b.add_double(value)
    }

    fn parse_string(&mut self) -> Result<()> {
        // The opening '"' has been consumed. Strings are written behind a
        // provisional short header; once the payload crosses 126 bytes the
        // header is widened in place to the 8-byte long form.
        self.b.report_add()?;
        let base = self.b.position();
        self.b.push_byte(0x40); // corrected when the string ends

        let mut large = false;
        let mut high_surrogate: u32 = 0;

        loop {
            let remainder = self.input.len() - self.pos;
            if remainder >= 16 {
                // the bulk routine may be handed 15 fewer bytes than remain;
                // the per-byte path below picks up the difference
                let src = &self.input[self.pos..self.pos + remainder - 15];
                let count = if self.validate_utf8 {
                    scan::json_string_copy_check_utf8(self.b.buffer_mut(), src)
                } else {
                    scan::json_string_copy(self.b.buffer_mut(), src)
                };
                self.pos += count;
            }

            let c = self.get_one("unfinished string")?;

            if !large && self.b.position() - (base + 1) > 126 {
                large = true;
                self.b.promote_string(base);
            }

            match c {
                b'"' => {
                    if self.validate_utf8 && high_surrogate != 0 {
                        return Err(Error::InvalidUtf8Sequence);
                    }
                    if large {
                        let len = (self.b.position() - (base + 9)) as u64;
                        let bytes = len.to_le_bytes();
                        let buf = self.b.buffer_mut();
                        buf[base] = 0xbf;
                        buf[base + 1..base + 9].copy_from_slice(&bytes);
                    } else {
                        let len = self.b.position() - (base + 1);
                        self.b.buffer_mut()[base] = 0x40 + len as u8;
                    }
                    return Ok(());
                }
                b'\\' => {
                    let e = self.get_one("invalid escape sequence")?;
                    match e {
                        b'"' | b'/' | b'\\' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(e);
                        }
                        b'b' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(0x08);
                        }
                        b'f' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(0x0c);
                        }
                        b'n' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(0x0a);
                        }
                        b'r' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(0x0d);
                        }
                        b't' => {
                            self.clear_surrogate(&mut high_surrogate)?;
                            self.b.push_byte(0x09);
                        }
                        b'u' => self.parse_unicode_escape(&mut high_surrogate)?,
                        _ => return Err(Error::Parse("invalid escape sequence", self.pos)),
                    }
                }
                _ => {
                    if c & 0x80 == 0 {
                        if c < 0x20 {
                            return Err(Error::UnexpectedControlCharacter);
                        }
                        self.clear_surrogate(&mut high_surrogate)?;
                        self.b.push_byte(c);
                    } else if !self.validate_utf8 {
                        high_surrogate = 0;
                        self.b.push_byte(c);
                    } else {
                        let follow = match c {
                            _ if c & 0xe0 == 0x80 => {
                                // lone continuation byte
                                return Err(Error::InvalidUtf8Sequence);
                            }
                            _ if c & 0xe0 == 0xc0 => {
                                if c < 0xc2 {
                                    // overlong two-byte encoding
                                    return Err(Error::InvalidUtf8Sequence);
                                }
                                1
                            }
                            _ if c & 0xf0 == 0xe0 => 2,
                            _ if c & 0xf8 == 0xf0 => 3,
                            _ => return Err(Error::InvalidUtf8Sequence),
                        };
                        self.clear_surrogate(&mut high_surrogate)?;
                        self.b.push_byte(c);
                        for _ in 0..follow {
                            let cc = self.get_one("truncated UTF-8 sequence")?;
                            if cc & 0xc0 != 0x80 {
                                return Err(Error::InvalidUtf8Sequence);
                            }
                            self.b.push_byte(cc);
                        }
                    }
                }
            }
        }
    }

    /// Forget a pending high surrogate. When validating, a pending high
    /// surrogate that is not followed by its low half is an error.
    #[inline]
    fn clear_surrogate(&mut self, high_surrogate: &mut u32) -> Result<()> {
        if *high_surrogate != 0 {
            if self.validate_utf8 {
                return Err(Error::InvalidUtf8Sequence);
            }
            *high_surrogate = 0;
        }
        Ok(())
    }

    fn parse_unicode_escape(&mut self, high_surrogate: &mut u32) -> Result<()> {
        let mut v: u32 = 0;
        for _ in 0..4 {
            let d = self.get_one("unfinished \\uXXXX escape sequence")?;
            let digit = match d {
                b'0'..=b'9' => u32::from(d - b'0'),
                b'a'..=b'f' => u32::from(d - b'a') + 10,
                b'A'..=b'F' => u32::from(d - b'A') + 10,
                _ => return Err(Error::Parse("illegal \\uXXXX escape sequence", self.pos)),
            };
            v = (v << 4) + digit;
        }

        if v < 0x80 {
            self.clear_surrogate(high_surrogate)?;
            self.b.push_byte(v as u8);
        } else if v < 0x800 {
            self.clear_surrogate(high_surrogate)?;
            self.b.push_byte(0xc0 + (v >> 6) as u8);
            self.b.push_byte(0x80 + (v & 0x3f) as u8);
        } else if (0xdc00..0xe000).contains(&v) && *high_surrogate != 0 {
            // low surrogate: rewind the provisional high half and emit the
            // combined code point as four bytes
            let combined = 0x10000 + ((*high_surrogate - 0xd800) << 10) + v - 0xdc00;
            let rewound = self.b.position() - 3;
            self.b.truncate_to(rewound);
            self.b.push_byte(0xf0 + (combined >> 18) as u8);
            self.b.push_byte(0x80 + ((combined >> 12) & 0x3f) as u8);
            self.b.push_byte(0x80 + ((combined >> 6) & 0x3f) as u8);
            self.b.push_byte(0x80 + (combined & 0x3f) as u8);
            *high_surrogate = 0;
        } else {
            if (0xd800..0xdc00).contains(&v) {
                self.clear_surrogate(high_surrogate)?;
                *high_surrogate = v;
            } else {
                if self.validate_utf8 && (0xd800..0xe000).contains(&v) {
                    // lone low surrogate
                    return Err(Error::InvalidUtf8Sequence);
                }
                self.clear_surrogate(high_surrogate)?;
            }
            self.b.push_byte(0xe0 + (v >> 12) as u8);
            self.b.push_byte(0x80 + ((v >> 6) & 0x3f) as u8);
            self.b.push_byte(0x80 + (v & 0x3f) as u8);
        }
        Ok(())
    }

    // --- VJSON ---

    fn parse_vjson_string(&mut self) -> Result<()> {
        if self.input.len() - self.pos < 2 {
            return Err(Error::Parse("invalid VJSON string value", self.pos));
        }
        let kind = self.input[self.pos];
        if self.input[self.pos + 1] != b':' {
            return Err(Error::Parse(
                "invalid VJSON string value, expecting ':'",
                self.pos,
            ));
        }
        match kind {
            b's' => {
                self.pos += 2;
                self.parse_string()
            }
            b'b' => {
                self.pos += 2;
                self.parse_base64()?;
                self.consume(); // the closing '"'
                Ok(())
            }
            b'd' => {
                self.pos += 2;
                self.parse_utc_date()?;
                self.consume(); // the closing '"'
                Ok(())
            }
            _ => Err(Error::Parse("invalid VJSON data type", self.pos)),
        }
    }

    fn parse_base64(&mut self) -> Result<()> {
        let err = Error::Parse("invalid VJSON base64 value", self.pos);
        let rest = &self.input[self.pos..];
        let length = rest.iter().position(|&b| b == b'"').ok_or(err.clone())?;

        let mut remainder = length;
        while remainder > 0 && self.input[self.pos + remainder - 1] == b'=' {
            remainder -= 1;
        }
        let decoded_len = 3 * remainder / 4;

        self.b.report_add()?;
        self.b.reserve_space(9 + decoded_len);
        self.b.append_uint_with_head(decoded_len as u64, 0xbf);

        if length == 0 {
            return Ok(());
        }

        let mut p = self.pos;
        loop {
            let b0 = decode_b64(self.input[p]);
            let b1 = if remainder > 1 { decode_b64(self.input[p + 1]) } else { 0xff };
            let b2 = if remainder > 2 { decode_b64(self.input[p + 2]) } else { 0xff };
            let b3 = if remainder > 3 { decode_b64(self.input[p + 3]) } else { 0xff };

            if b0 == 0xff || b1 == 0xff {
                return Err(err);
            }
            self.b.push_byte(((b0 & 0x3f) << 2) + ((b1 & 0x30) >> 4));
            if b2 != 0xff {
                self.b.push_byte(((b1 & 0x0f) << 4) + ((b2 & 0x3c) >> 2));
                if b3 != 0xff {
                    self.b.push_byte(((b2 & 0x03) << 6) + (b3 & 0x3f));
                } else if remainder > 3 {
                    return Err(err);
                }
            } else if remainder > 2 {
                return Err(err);
            }

            if remainder <= 4 {
                break;
            }
            remainder -= 4;
            p += 4;
        }

        self.pos += length;
        Ok(())
    }

    fn parse_utc_date(&mut self) -> Result<()> {
        let err = Error::Parse("invalid VJSON datetime value", self.pos);
        let rest = &self.input[self.pos..];
        let length = rest.iter().position(|&b| b == b'"').ok_or(err.clone())?;
        let text = std::str::from_utf8(&rest[..length]).map_err(|_| err.clone())?;
        let timestamp = OffsetDateTime::parse(text, &Rfc3339).map_err(|_| err)?;
        let millis = (timestamp.unix_timestamp_nanos() / 1_000_000) as i64;
        self.b.add_utc_date(millis)?;
        self.pos += length;
        Ok(())
    }
}
