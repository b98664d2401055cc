use std::fmt;

pub struct DebugEllipsis(pub Option<usize>);

impl fmt::Debug for DebugEllipsis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("...")?;
        if let Some(size) = self.0 {
            write!(f, "({size})")?;
        }
        Ok(())
    }
}

/// Debug-formats an iterator as a list, truncated to `limit` entries with a
/// trailing ellipsis carrying the omitted count.
pub struct DebugList<I>(I, usize);

impl<I> DebugList<I> {
    pub fn new(iter: I, limit: usize) -> Self {
        Self(iter, limit)
    }
}

impl<I, T> fmt::Debug for DebugList<I>
where
    I: Iterator<Item = T> + Clone,
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.clone().count();
        if len <= self.1 {
            return f.debug_list().entries(self.0.clone()).finish();
        }
        f.debug_list()
            .entries(self.0.clone().take(self.1))
            .entry(&DebugEllipsis(Some(len - self.1)))
            .finish()
    }
}
