use crate::ids::BatchToken;

/// Records handed out by one `start_processing_*` call.
///
/// The service owns the memory behind these records until the batch comes back through the
/// matching `finish_processing_*` call. Finishing consumes the batch, so it can be returned
/// at most once; the token lets the service reject a batch that is not the one it handed out
/// most recently.
#[derive(Debug)]
#[must_use = "a drained batch must be handed back through finish_processing"]
pub struct StateChangeBatch<T> {
    token: BatchToken,
    records: Vec<T>,
}

impl<T> StateChangeBatch<T> {
    pub fn new(token: BatchToken, records: Vec<T>) -> Self {
        Self { token, records }
    }

    pub fn token(&self) -> BatchToken {
        self.token
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

impl<'a, T> IntoIterator for &'a StateChangeBatch<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
