//! Incremental construction of VPACK values into a growing byte buffer.
//!
//! A [`Builder`] appends scalar values and opens/closes containers. While a
//! container is open its header is a 9-byte provisional block; [`close`]
//! picks the narrowest layout that fits, moves the payload down if the final
//! header is shorter, and appends the index structures. For objects that
//! means building the cuckoo hash table: a seed byte and slot count are
//! searched until all keys place within the eviction budget, and the chosen
//! seed is stored in the value so lookup stays stateless.
//!
//! [`close`]: Builder::close

use crate::error::{Error, Result};
use crate::hash::{fast_mod32, fasthash64x3};
use crate::options::Options;
use crate::seeds::SEED_TABLE;
use crate::slice::Slice;
use crate::tag;

/// Provisional header bytes reserved when a container is opened.
const PROVISIONAL_HEADER: usize = 9;

/// Layout candidates for objects: (head, width, first sub-value offset).
const OBJECT_LAYOUTS: [(u8, usize, usize); 4] =
    [(0x0b, 1, 5), (0x0c, 2, 9), (0x0d, 4, 9), (0x0e, 8, 9)];

/// Layout candidates for arrays without an index table.
const ARRAY_PLAIN_LAYOUTS: [(u8, usize, usize); 4] =
    [(0x02, 1, 2), (0x03, 2, 3), (0x04, 4, 5), (0x05, 8, 9)];

/// Layout candidates for arrays with an index table.
const ARRAY_INDEXED_LAYOUTS: [(u8, usize, usize); 4] =
    [(0x06, 1, 3), (0x07, 2, 5), (0x08, 4, 9), (0x09, 8, 9)];

/// Largest byte length representable in a length field of the given width.
#[inline]
fn max_length(width: usize) -> u64 {
    if width == 8 { u64::MAX } else { (1u64 << (8 * width)) - 1 }
}

/// Builds VPACK values incrementally.
pub struct Builder {
    buf: Vec<u8>,
    /// Offsets of the open containers, outermost first.
    stack: Vec<usize>,
    /// Per open container: offsets of its sub-values (for objects, of its
    /// key/value pairs), relative to the container start.
    index: Vec<Vec<usize>>,
    /// Inside an open object: true between a key add and its value add.
    key_written: bool,
    options: Options,
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Builder::with_options(Options::default())
    }

    #[must_use]
    pub fn with_options(options: Options) -> Self {
        Builder {
            buf: Vec::new(),
            stack: Vec::new(),
            index: Vec::new(),
            key_written: false,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Raw buffer contents written so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the builder and return its buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Current write offset.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// True when no container is open.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stack.is_empty()
    }

    /// Ensure at least `n` further bytes can be written without reallocation.
    pub fn reserve_space(&mut self, n: usize) {
        self.buf.reserve(n);
    }

    /// View the finished value.
    ///
    /// # Errors
    ///
    /// Fails while a container is still open or nothing has been added.
    pub fn slice(&self) -> Result<Slice<'_>> {
        if !self.stack.is_empty() {
            return Err(Error::Internal("builder value is not sealed"));
        }
        Slice::new(&self.buf)
    }

    // --- index bookkeeping ---

    /// Record the start of the next sub-value in the enclosing container.
    ///
    /// Inside an object this alternates between registering a key (which
    /// must be a string or a translated integer id) and swallowing the
    /// following value. Outside any container it is a no-op.
    pub fn report_add(&mut self) -> Result<()> {
        self.report(true)
    }

    fn report(&mut self, valid_key: bool) -> Result<()> {
        let Some(&tos) = self.stack.last() else {
            return Ok(());
        };
        let depth = self.stack.len() - 1;
        if self.buf[tos] == 0x0b {
            if self.key_written {
                self.key_written = false;
            } else {
                if !valid_key {
                    return Err(Error::BuilderKeyMustBeString);
                }
                let offset = self.buf.len() - tos;
                self.index[depth].push(offset);
                self.key_written = true;
            }
        } else {
            let offset = self.buf.len() - tos;
            self.index[depth].push(offset);
        }
        Ok(())
    }

    /// Undo the most recent [`report_add`](Builder::report_add) after a
    /// failed value emission, discarding any bytes written for it.
    pub fn cleanup_add(&mut self) {
        let Some(&tos) = self.stack.last() else {
            return;
        };
        let depth = self.stack.len() - 1;
        if let Some(offset) = self.index[depth].pop() {
            self.buf.truncate(tos + offset);
            self.key_written = false;
        }
    }

    /// Remove the last sub-value (for objects: the last key/value pair) from
    /// the open container.
    pub fn remove_last(&mut self) -> Result<()> {
        let &tos = self
            .stack
            .last()
            .ok_or(Error::Internal("no open container"))?;
        let depth = self.stack.len() - 1;
        let offset = self.index[depth]
            .pop()
            .ok_or(Error::Internal("no value to remove"))?;
        self.buf.truncate(tos + offset);
        self.key_written = false;
        Ok(())
    }

    // --- scalar adds ---

    pub fn add_null(&mut self) -> Result<()> {
        self.report(false)?;
        self.buf.push(0x18);
        Ok(())
    }

    pub fn add_bool(&mut self, value: bool) -> Result<()> {
        self.report(false)?;
        self.buf.push(if value { 0x1a } else { 0x19 });
        Ok(())
    }

    pub fn add_double(&mut self, value: f64) -> Result<()> {
        self.report(false)?;
        self.buf.push(0x1b);
        self.buf.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Add a UTCDate from milliseconds since the epoch.
    pub fn add_utc_date(&mut self, millis: i64) -> Result<()> {
        self.report(false)?;
        self.buf.push(0x1c);
        self.buf.extend_from_slice(&(millis as u64).to_le_bytes());
        Ok(())
    }

    /// Add a signed integer in its minimal encoding (SmallInt, then Int).
    pub fn add_int(&mut self, value: i64) -> Result<()> {
        self.report(true)?;
        if (0..=9).contains(&value) {
            self.buf.push(0x30 + value as u8);
        } else if (-6..0).contains(&value) {
            self.buf.push(0x3a + (value + 6) as u8);
        } else {
            let width = tag::int_width(value);
            self.buf.push(0x1f + width as u8);
            self.buf
                .extend_from_slice(&(value as u64).to_le_bytes()[..width]);
        }
        Ok(())
    }

    /// Add an unsigned integer in its minimal encoding (SmallInt, then UInt).
    pub fn add_uint(&mut self, value: u64) -> Result<()> {
        self.report(true)?;
        if value <= 9 {
            self.buf.push(0x30 + value as u8);
        } else {
            let width = tag::uint_width(value);
            self.buf.push(0x27 + width as u8);
            self.buf.extend_from_slice(&value.to_le_bytes()[..width]);
        }
        Ok(())
    }

    pub fn add_string(&mut self, value: &str) -> Result<()> {
        self.report(true)?;
        let bytes = value.as_bytes();
        if bytes.len() <= 126 {
            self.buf.push(0x40 + bytes.len() as u8);
        } else {
            self.buf.push(0xbf);
            self.buf
                .extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn add_binary(&mut self, data: &[u8]) -> Result<()> {
        self.report(false)?;
        self.append_uint_with_head(data.len() as u64, 0xbf);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Append a head byte of `base + width` followed by `value` in `width`
    /// little-endian bytes, where `width` is minimal. With base `0xbf` this
    /// emits a Binary header, with `0x27` a UInt.
    ///
    /// This is a raw primitive: it does not register the value in the
    /// enclosing container.
    pub fn append_uint_with_head(&mut self, value: u64, base: u8) {
        let width = tag::uint_width(value);
        self.buf.push(base + width as u8);
        self.buf.extend_from_slice(&value.to_le_bytes()[..width]);
    }

    // --- containers ---

    /// Open an Array.
    pub fn add_array(&mut self) -> Result<()> {
        self.open_compound(0x06)
    }

    /// Open an Object.
    pub fn add_object(&mut self) -> Result<()> {
        self.open_compound(0x0b)
    }

    fn open_compound(&mut self, head: u8) -> Result<()> {
        self.report(false)?;
        let start = self.buf.len();
        self.buf.push(head);
        self.buf.extend_from_slice(&[0u8; PROVISIONAL_HEADER - 1]);
        self.stack.push(start);
        self.index.push(Vec::new());
        Ok(())
    }

    /// Seal the innermost open container, choosing its final layout.
    pub fn close(&mut self) -> Result<()> {
        let &start = self
            .stack
            .last()
            .ok_or(Error::Internal("no open container"))?;
        if self.key_written {
            return Err(Error::Internal("attribute key without value"));
        }
        let depth = self.stack.len() - 1;
        let items = std::mem::take(&mut self.index[depth]);

        let result = if self.buf[start] == 0x0b {
            self.close_object(start, &items)
        } else {
            self.close_array(start, &items)
        };
        match result {
            Ok(()) => {
                self.stack.pop();
                self.index.pop();
                Ok(())
            }
            Err(e) => {
                self.index[depth] = items;
                Err(e)
            }
        }
    }

    fn close_array(&mut self, start: usize, items: &[usize]) -> Result<()> {
        let pos = self.buf.len();
        let n = items.len();
        if n == 0 {
            self.buf.truncate(start);
            self.buf.push(0x01);
            return Ok(());
        }
        if self.options.build_unindexed_arrays {
            self.close_compact(start, items, 0x13);
            return Ok(());
        }

        let payload_len = pos - (start + PROVISIONAL_HEADER);
        let payload_end = pos - start;
        let first_size = item_size(items, 0, payload_end);
        let equal_sized = (1..n).all(|i| item_size(items, i, payload_end) == first_size);

        if equal_sized {
            let (head, width, first) = ARRAY_PLAIN_LAYOUTS
                .iter()
                .copied()
                .find(|&(_, w, f)| (f + payload_len) as u64 <= max_length(w))
                .ok_or(Error::Internal("array does not fit any layout"))?;
            let total = first + payload_len;
            self.buf.copy_within(start + PROVISIONAL_HEADER..pos, start + first);
            self.buf.truncate(start + total);
            self.buf[start] = head;
            self.write_uint_field(start + 1, total as u64, width);
        } else {
            let (head, width, first) = ARRAY_INDEXED_LAYOUTS
                .iter()
                .copied()
                .find(|&(_, w, f)| {
                    let tail = if w == 8 { 8 } else { 0 };
                    (f + payload_len + n * w + tail) as u64 <= max_length(w)
                })
                .ok_or(Error::Internal("array does not fit any layout"))?;
            let tail = if width == 8 { 8 } else { 0 };
            let total = first + payload_len + n * width + tail;
            self.buf.copy_within(start + PROVISIONAL_HEADER..pos, start + first);
            self.buf.truncate(start + first + payload_len);
            for &item in items {
                let offset = first + (item - PROVISIONAL_HEADER);
                let bytes = (offset as u64).to_le_bytes();
                self.buf.extend_from_slice(&bytes[..width]);
            }
            if width == 8 {
                self.buf.extend_from_slice(&(n as u64).to_le_bytes());
            }
            self.buf[start] = head;
            self.write_uint_field(start + 1, total as u64, width);
            if width < 8 {
                self.write_uint_field(start + 1 + width, n as u64, width);
            }
        }
        Ok(())
    }

    fn close_object(&mut self, start: usize, items: &[usize]) -> Result<()> {
        let pos = self.buf.len();
        let n = items.len();
        if n == 0 {
            self.buf.truncate(start);
            self.buf.push(0x0a);
            return Ok(());
        }
        if self.options.build_unindexed_objects {
            self.close_compact(start, items, 0x14);
            return Ok(());
        }

        let payload_len = pos - (start + PROVISIONAL_HEADER);
        let payload_end = pos - start;

        // read-only phase: resolve key names, order, and the hash table
        let mut names: Vec<Vec<u8>> = Vec::with_capacity(n);
        for &item in items {
            let key = Slice::new(&self.buf[start + item..])?;
            let name = key.key_name(&self.options).map_err(|e| match e {
                Error::InvalidValueType(_) => Error::BuilderKeyMustBeString,
                other => other,
            })?;
            names.push(name.to_vec());
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.options.sort_attribute_names {
            order.sort_by(|&a, &b| names[a].cmp(&names[b]));
        }
        if self.options.check_attribute_uniqueness {
            let mut sorted: Vec<&[u8]> = names.iter().map(Vec::as_slice).collect();
            sorted.sort_unstable();
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::DuplicateAttributeName);
            }
        }

        let ordered_names: Vec<&[u8]> =
            order.iter().map(|&i| names[i].as_slice()).collect();
        let (n_slots, seed, slots) = build_cuckoo_table(&ordered_names)?;

        let (head, width, first) = OBJECT_LAYOUTS
            .iter()
            .copied()
            .find(|&(_, w, f)| {
                let tail = if w < 4 { 0 } else { 1 + 2 * w };
                (f + payload_len + n_slots * w + tail) as u64 <= max_length(w)
            })
            .ok_or(Error::Internal("object does not fit any layout"))?;

        // mutate phase: reorder pairs, move the payload, append the table
        let mut pair_offsets: Vec<usize> = items.to_vec();
        if order.iter().enumerate().any(|(i, &o)| i != o) {
            let mut scratch = Vec::with_capacity(payload_len);
            let mut reordered = Vec::with_capacity(n);
            for &i in &order {
                reordered.push(PROVISIONAL_HEADER + scratch.len());
                let end = item_end(items, i, payload_end);
                scratch.extend_from_slice(&self.buf[start + items[i]..start + end]);
            }
            self.buf[start + PROVISIONAL_HEADER..pos].copy_from_slice(&scratch);
            pair_offsets = reordered;
        }

        if first < PROVISIONAL_HEADER {
            self.buf.copy_within(start + PROVISIONAL_HEADER..pos, start + first);
        }
        self.buf.truncate(start + first + payload_len);

        for slot in &slots {
            let value = match slot {
                Some(item) => (first + pair_offsets[*item] - PROVISIONAL_HEADER) as u64,
                None => 0,
            };
            let bytes = value.to_le_bytes();
            self.buf.extend_from_slice(&bytes[..width]);
        }

        let tail = if width < 4 { 0 } else { 1 + 2 * width };
        let total = first + payload_len + n_slots * width + tail;
        if width < 4 {
            self.buf[start] = head;
            self.write_uint_field(start + 1, total as u64, width);
            self.write_uint_field(start + 1 + width, n as u64, width);
            self.write_uint_field(start + 1 + 2 * width, n_slots as u64, width);
            self.buf[start + 1 + 3 * width] = seed;
        } else {
            let n_bytes = (n as u64).to_le_bytes();
            self.buf.extend_from_slice(&n_bytes[..width]);
            let slot_bytes = (n_slots as u64).to_le_bytes();
            self.buf.extend_from_slice(&slot_bytes[..width]);
            self.buf.push(seed);
            self.buf[start] = head;
            self.write_uint_field(start + 1, total as u64, width);
        }
        debug_assert_eq!(self.buf.len(), start + total);
        Ok(())
    }

    fn close_compact(&mut self, start: usize, items: &[usize], head: u8) {
        let pos = self.buf.len();
        let payload_len = pos - (start + PROVISIONAL_HEADER);
        let n = items.len() as u64;
        let n_len = tag::varint_len(n);

        // the total length includes its own varint encoding
        let mut byte_len = 1 + 1 + payload_len + n_len;
        loop {
            let recomputed = 1 + tag::varint_len(byte_len as u64) + payload_len + n_len;
            if recomputed == byte_len {
                break;
            }
            byte_len = recomputed;
        }
        let header = 1 + tag::varint_len(byte_len as u64);

        if header != PROVISIONAL_HEADER {
            if header > PROVISIONAL_HEADER {
                self.buf.resize(pos + header - PROVISIONAL_HEADER, 0);
            }
            self.buf
                .copy_within(start + PROVISIONAL_HEADER..pos, start + header);
            self.buf.truncate(start + header + payload_len);
        }

        self.buf[start] = head;
        let mut length_field = Vec::with_capacity(8);
        tag::write_varint_forward(byte_len as u64, &mut length_field);
        self.buf[start + 1..start + 1 + length_field.len()].copy_from_slice(&length_field);
        tag::write_varint_backward(n, &mut self.buf);
        debug_assert_eq!(self.buf.len(), start + byte_len);
    }

    fn write_uint_field(&mut self, at: usize, value: u64, width: usize) {
        let bytes = value.to_le_bytes();
        self.buf[at..at + width].copy_from_slice(&bytes[..width]);
    }

    // --- parser access ---

    pub(crate) fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub(crate) fn push_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub(crate) fn truncate_to(&mut self, position: usize) {
        self.buf.truncate(position);
    }

    /// Widen the short-string header that starts at `base` to the long form:
    /// move the payload written so far 8 bytes forward to make room for the
    /// 8-byte length field.
    pub(crate) fn promote_string(&mut self, base: usize) {
        let payload = self.buf.len() - (base + 1);
        self.buf.resize(self.buf.len() + 8, 0);
        self.buf.copy_within(base + 1..base + 1 + payload, base + 9);
    }

    pub(crate) fn top_index_len(&self) -> usize {
        match self.stack.last() {
            Some(_) => self.index[self.stack.len() - 1].len(),
            None => 0,
        }
    }

    pub(crate) fn open_depth(&self) -> usize {
        self.stack.len()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

/// End offset (relative to the container start) of the i-th sub-value.
#[inline]
fn item_end(items: &[usize], i: usize, payload_end: usize) -> usize {
    if i + 1 < items.len() { items[i + 1] } else { payload_end }
}

/// Byte size of the i-th sub-value.
#[inline]
fn item_size(items: &[usize], i: usize, payload_end: usize) -> usize {
    item_end(items, i, payload_end) - items[i]
}

/// Search a slot count and seed under which every key places into the table.
///
/// The search is deterministic: for each slot count, all 256 seeds are tried
/// in order; insertion evicts along the three candidate slots round-robin
/// with a bounded number of kicks. Returns the slot assignment as
/// `slot -> Some(item index)`.
fn build_cuckoo_table(names: &[&[u8]]) -> Result<(usize, u8, Vec<Option<usize>>)> {
    let n = names.len();
    let mut n_slots = n + n / 4 + 1;
    for _round in 0..32 {
        for seed in 0..=255u8 {
            if let Some(slots) = try_place(names, n_slots, seed) {
                return Ok((n_slots, seed, slots));
            }
        }
        n_slots += n_slots / 3 + 1;
    }
    // only reachable with heavily duplicated keys
    Err(Error::Internal("unable to build object hash table"))
}

fn try_place(names: &[&[u8]], n_slots: usize, seed: u8) -> Option<Vec<Option<usize>>> {
    let base = 3 * seed as usize;
    let seeds = [SEED_TABLE[base], SEED_TABLE[base + 1], SEED_TABLE[base + 2]];
    let small = n_slots <= 0x0100_0000;

    let candidates: Vec<[usize; 3]> = names
        .iter()
        .map(|name| {
            let hashes = fasthash64x3(name, &seeds);
            let mut c = [0usize; 3];
            for k in 0..3 {
                c[k] = if small {
                    fast_mod32(hashes[k], n_slots as u64) as usize
                } else {
                    (hashes[k] % n_slots as u64) as usize
                };
            }
            c
        })
        .collect();

    let mut slots: Vec<Option<usize>> = vec![None; n_slots];
    let max_kicks = 16 + 4 * names.len();
    for item in 0..names.len() {
        let mut current = item;
        let mut turn = 0usize;
        let mut kicks = 0usize;
        loop {
            if let Some(k) = candidates[current].iter().position(|&p| slots[p].is_none()) {
                slots[candidates[current][k]] = Some(current);
                break;
            }
            let victim_slot = candidates[current][turn % 3];
            turn += 1;
            let evicted = slots[victim_slot].replace(current).expect("slot occupied");
            current = evicted;
            kicks += 1;
            if kicks > max_kicks {
                return None;
            }
        }
    }
    Some(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_encodings() {
        let mut b = Builder::new();
        b.add_int(1).unwrap();
        assert_eq!(b.bytes(), &[0x31]);

        let mut b = Builder::new();
        b.add_int(-3).unwrap();
        assert_eq!(b.bytes(), &[0x3d]);

        let mut b = Builder::new();
        b.add_int(-128).unwrap();
        assert_eq!(b.bytes(), &[0x20, 0x80]);

        let mut b = Builder::new();
        b.add_uint(256).unwrap();
        assert_eq!(b.bytes(), &[0x29, 0x00, 0x01]);

        let mut b = Builder::new();
        b.add_int(i64::MIN).unwrap();
        assert_eq!(b.bytes()[0], 0x27);
        assert_eq!(b.slice().unwrap().get_int().unwrap(), i64::MIN);

        let mut b = Builder::new();
        b.add_uint(u64::MAX).unwrap();
        assert_eq!(b.bytes()[0], 0x2f);

        let mut b = Builder::new();
        b.add_string("x").unwrap();
        assert_eq!(b.bytes(), &[0x41, b'x']);

        let mut b = Builder::new();
        b.add_binary(b"Hello").unwrap();
        assert_eq!(b.bytes()[..2], [0xc0, 0x05]);
    }

    #[test]
    fn test_empty_containers() {
        let mut b = Builder::new();
        b.add_array().unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes(), &[0x01]);

        let mut b = Builder::new();
        b.add_object().unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes(), &[0x0a]);
    }

    #[test]
    fn test_equal_sized_array() {
        let mut b = Builder::new();
        b.add_array().unwrap();
        for i in 1..=3 {
            b.add_int(i).unwrap();
        }
        b.close().unwrap();
        assert_eq!(b.bytes(), &[0x02, 0x05, 0x31, 0x32, 0x33]);
    }

    #[test]
    fn test_indexed_array() {
        let mut b = Builder::new();
        b.add_array().unwrap();
        b.add_bool(true).unwrap();
        b.add_null().unwrap();
        b.add_string("x").unwrap();
        b.close().unwrap();
        // unequal element sizes force an index table
        assert_eq!(
            b.bytes(),
            &[0x06, 0x0a, 0x03, 0x1a, 0x18, 0x41, b'x', 0x03, 0x04, 0x05]
        );
        let slice = b.slice().unwrap();
        assert_eq!(slice.length().unwrap(), 3);
        assert_eq!(slice.get_nth(2).unwrap().get_str().unwrap(), "x");
    }

    #[test]
    fn test_object_lookup_roundtrip() {
        let mut b = Builder::new();
        b.add_object().unwrap();
        b.add_string("alpha").unwrap();
        b.add_int(1).unwrap();
        b.add_string("beta").unwrap();
        b.add_bool(true).unwrap();
        b.close().unwrap();

        let slice = b.slice().unwrap();
        assert_eq!(slice.head(), 0x0b);
        assert_eq!(slice.length().unwrap(), 2);
        assert_eq!(slice.get("alpha").unwrap().get_int().unwrap(), 1);
        assert!(slice.get("beta").unwrap().get_bool().unwrap());
        assert!(slice.get("gamma").unwrap().is_none());
    }

    #[test]
    fn test_sorted_attribute_names() {
        let mut b = Builder::new();
        b.add_object().unwrap();
        b.add_string("zz").unwrap();
        b.add_int(1).unwrap();
        b.add_string("aa").unwrap();
        b.add_int(2).unwrap();
        b.close().unwrap();

        let slice = b.slice().unwrap();
        assert_eq!(slice.get_nth_key(0).unwrap().get_str().unwrap(), "aa");
        assert_eq!(slice.get_nth_key(1).unwrap().get_str().unwrap(), "zz");
        assert_eq!(slice.get("zz").unwrap().get_int().unwrap(), 1);
        assert_eq!(slice.get("aa").unwrap().get_int().unwrap(), 2);
    }

    #[test]
    fn test_unsorted_preserves_insertion_order() {
        let mut options = Options::default();
        options.sort_attribute_names = false;
        let mut b = Builder::with_options(options);
        b.add_object().unwrap();
        b.add_string("zz").unwrap();
        b.add_int(1).unwrap();
        b.add_string("aa").unwrap();
        b.add_int(2).unwrap();
        b.close().unwrap();
        let slice = b.slice().unwrap();
        assert_eq!(slice.get_nth_key(0).unwrap().get_str().unwrap(), "zz");
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let mut options = Options::default();
        options.check_attribute_uniqueness = true;
        let mut b = Builder::with_options(options);
        b.add_object().unwrap();
        b.add_string("a").unwrap();
        b.add_int(1).unwrap();
        b.add_string("a").unwrap();
        b.add_int(2).unwrap();
        assert_eq!(b.close().unwrap_err(), Error::DuplicateAttributeName);
    }

    #[test]
    fn test_key_must_be_string() {
        let mut b = Builder::new();
        b.add_object().unwrap();
        assert_eq!(b.add_bool(true).unwrap_err(), Error::BuilderKeyMustBeString);
    }

    #[test]
    fn test_compact_containers() {
        let mut options = Options::default();
        options.build_unindexed_arrays = true;
        options.build_unindexed_objects = true;
        let mut b = Builder::with_options(options);
        b.add_array().unwrap();
        b.add_int(1).unwrap();
        b.add_uint(16).unwrap();
        b.close().unwrap();
        assert_eq!(b.bytes(), &[0x13, 0x06, 0x31, 0x28, 0x10, 0x02]);

        let mut options = Options::default();
        options.build_unindexed_objects = true;
        let mut b = Builder::with_options(options);
        b.add_object().unwrap();
        b.add_string("a").unwrap();
        b.add_int(1).unwrap();
        b.close().unwrap();
        let slice = b.slice().unwrap();
        assert_eq!(slice.head(), 0x14);
        assert_eq!(slice.get("a").unwrap().get_int().unwrap(), 1);
    }

    #[test]
    fn test_remove_last() {
        let mut b = Builder::new();
        b.add_array().unwrap();
        b.add_int(1).unwrap();
        b.add_int(2).unwrap();
        b.remove_last().unwrap();
        b.close().unwrap();
        let slice = b.slice().unwrap();
        assert_eq!(slice.length().unwrap(), 1);
        assert_eq!(slice.get_nth(0).unwrap().get_int().unwrap(), 1);
    }

    #[test]
    fn test_nested() {
        let mut b = Builder::new();
        b.add_object().unwrap();
        b.add_string("list").unwrap();
        b.add_array().unwrap();
        b.add_int(1).unwrap();
        b.add_string("two").unwrap();
        b.close().unwrap();
        b.add_string("flag").unwrap();
        b.add_bool(false).unwrap();
        b.close().unwrap();

        let slice = b.slice().unwrap();
        let list = slice.get("list").unwrap();
        assert!(list.is_array());
        assert_eq!(list.length().unwrap(), 2);
        assert_eq!(list.get_nth(1).unwrap().get_str().unwrap(), "two");
        assert!(!slice.get("flag").unwrap().get_bool().unwrap());
    }

    #[test]
    fn test_slice_requires_sealed() {
        let mut b = Builder::new();
        b.add_array().unwrap();
        assert!(b.slice().is_err());
    }

    #[test]
    fn test_cuckoo_table_determinism() {
        let names: Vec<Vec<u8>> = (0..50).map(|i| format!("key{i}").into_bytes()).collect();
        let refs: Vec<&[u8]> = names.iter().map(Vec::as_slice).collect();
        let a = build_cuckoo_table(&refs).unwrap();
        let b = build_cuckoo_table(&refs).unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
        assert_eq!(a.2, b.2);
        // every item is placed exactly once
        let placed: Vec<usize> = a.2.iter().filter_map(|s| *s).collect();
        assert_eq!(placed.len(), names.len());
    }
}
