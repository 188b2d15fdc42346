use crate::{
    error::{Error, Result},
    model::TitleRecord,
    query_filter::TitleFilter,
};

/// Read access the search core needs from the document store.
pub trait TitleStore: Send + Sync {
    /// Records matching any clause of `filter`, stopping after `limit`
    /// records when one is given.
    ///
    /// Records are ordered by the best clause tier they match, then by the
    /// store's natural order. See
    /// [`crate::query_filter::CompiledFilter::fill_pool`].
    fn find_where(
        &self,
        filter: &TitleFilter,
        limit: Option<usize>,
    ) -> Result<Vec<TitleRecord>>;

    /// Number of records matching `filter`, without a limit.
    fn count(&self, filter: &TitleFilter) -> Result<usize>;
}

/// Full scan over records already in memory.
impl TitleStore for [TitleRecord] {
    fn find_where(
        &self,
        filter: &TitleFilter,
        limit: Option<usize>,
    ) -> Result<Vec<TitleRecord>> {
        filter.compile()?.fill_pool(
            self.iter().cloned().map(Ok::<_, Error>),
            limit.unwrap_or(usize::MAX),
        )
    }

    fn count(&self, filter: &TitleFilter) -> Result<usize> {
        let matcher = filter.compile()?;
        Ok(self.iter().filter(|record| matcher.matches(record)).count())
    }
}
