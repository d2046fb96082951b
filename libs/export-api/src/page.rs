use crate::filter::PrototypeFilter;
use crate::types::Record;

/// Select one page out of a batch's records.
///
/// Keeps records accepted by `filter` with `order >= start_order`, sorted by
/// `order` ascending, truncated to `count`. Input order does not matter.
/// `count == 0` yields an empty page.
pub fn select_page(
    records: impl IntoIterator<Item = Record>,
    filter: &PrototypeFilter,
    start_order: i32,
    count: u32,
) -> Vec<Record> {
    if count == 0 {
        return Vec::new();
    }

    let mut page: Vec<Record> = records
        .into_iter()
        .filter(|r| r.order >= start_order && filter.matches(r))
        .collect();
    page.sort_by_key(|r| r.order);
    page.truncate(count as usize);
    page
}
