//! K-way merge over several SSTable iterators.

use crate::{OrderedIterator, SstError, SstIter};

/// Merges several SSTable iterators into one ascending stream.
///
/// Inputs must be ordered **newest first**. When the same key appears in
/// more than one input, the value from the earliest input (the newest
/// table) wins and every tied iterator is advanced past the key, so each
/// key is emitted exactly once. Tombstones are yielded like any record;
/// dropping them is the caller's policy, not the merge's.
pub struct MergeIterator<'a> {
    inputs: Vec<SstIter<'a>>,
    current: Option<(Vec<u8>, Option<Vec<u8>>)>,
}

impl<'a> MergeIterator<'a> {
    /// Builds a merge over already-positioned iterators and advances to the
    /// first record.
    pub fn new(inputs: Vec<SstIter<'a>>) -> Result<Self, SstError> {
        let mut merge = Self {
            inputs,
            current: None,
        };
        merge.advance()?;
        Ok(merge)
    }

    fn advance(&mut self) -> Result<(), SstError> {
        self.current = None;

        // Smallest key among the live inputs.
        let mut min_key: Option<Vec<u8>> = None;
        for input in &self.inputs {
            if !input.valid() {
                continue;
            }
            match &min_key {
                Some(min) if input.key() >= min.as_slice() => {}
                _ => min_key = Some(input.key().to_vec()),
            }
        }
        let Some(min_key) = min_key else {
            return Ok(());
        };

        // The first (newest) input holding the key supplies the value; every
        // tied input steps past it.
        let mut value: Option<Option<Vec<u8>>> = None;
        for input in &mut self.inputs {
            if input.valid() && input.key() == min_key.as_slice() {
                if value.is_none() {
                    value = Some(input.value().map(<[u8]>::to_vec));
                }
                input.next()?;
            }
        }

        if let Some(value) = value {
            self.current = Some((min_key, value));
        }
        Ok(())
    }
}

impl OrderedIterator for MergeIterator<'_> {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().and_then(|(_, v)| v.as_deref())
    }

    fn next(&mut self) -> Result<(), SstError> {
        self.advance()
    }
}
