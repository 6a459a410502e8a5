//! Owning arena for slices that must outlive a throwaway parse buffer.

use std::cell::RefCell;

use crate::error::Result;
use crate::options::Options;
use crate::parser::Parser;
use crate::slice::Slice;

/// An arena of byte blocks. [`SliceScope::add`] copies bytes into a freshly
/// allocated block and hands out a [`Slice`] borrowing the scope; all blocks
/// are freed together when the scope is dropped.
#[derive(Default)]
pub struct SliceScope {
    allocations: RefCell<Vec<Box<[u8]>>>,
}

impl SliceScope {
    #[must_use]
    pub fn new() -> Self {
        SliceScope::default()
    }

    /// Copy `bytes` into the scope and return a slice over the copy.
    ///
    /// # Errors
    ///
    /// Returns `Error::TruncatedValue` if `bytes` is empty.
    pub fn add(&self, bytes: &[u8]) -> Result<Slice<'_>> {
        let block: Box<[u8]> = Box::from(bytes);
        let ptr: *const [u8] = &*block;
        self.allocations.borrow_mut().push(block);
        // SAFETY: the boxed block has a stable heap address, is never handed
        // out mutably, and lives in `self.allocations` until the scope is
        // dropped. The returned borrow cannot outlive `&self`.
        Slice::new(unsafe { &*ptr })
    }

    /// Number of blocks held by the scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.borrow().is_empty()
    }
}

impl<'a> Slice<'a> {
    /// Parse `json` and copy the resulting value into `scope`, returning a
    /// slice that stays valid for the scope's lifetime.
    pub fn from_json(scope: &'a SliceScope, json: &str, options: &Options) -> Result<Slice<'a>> {
        let mut parser = Parser::new(options.clone());
        parser.parse(json.as_bytes())?;
        scope.add(parser.builder().bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_outlive_additions() {
        let scope = SliceScope::new();
        let a = scope.add(&[0x31]).unwrap();
        let b = scope.add(&[0x42, b'h', b'i']).unwrap();
        // adding more blocks must not invalidate earlier slices
        for _ in 0..100 {
            scope.add(&[0x18]).unwrap();
        }
        assert_eq!(a.get_int().unwrap(), 1);
        assert_eq!(b.get_str().unwrap(), "hi");
        assert_eq!(scope.len(), 102);
    }

    #[test]
    fn test_from_json() {
        let scope = SliceScope::new();
        let options = Options::default();
        let v = Slice::from_json(&scope, r#"{"a": 1}"#, &options).unwrap();
        assert!(v.is_object());
        assert_eq!(v.get("a").unwrap().get_int().unwrap(), 1);
    }
}
