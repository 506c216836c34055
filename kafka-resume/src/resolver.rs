use crate::types::{Partition, Position, ResumeOffset, StartOffset};

/// Decides where consumption of `partition` resumes.
///
/// No recorded position means a full replay from the beginning of the
/// partition. A recorded position `N` means `N` was already processed, so
/// fetching starts at `N + 1`.
pub fn resolve(partition: &Partition, position: Option<&Position>) -> ResumeOffset {
    let start = match position.and_then(Position::offset) {
        None => StartOffset::Beginning,
        Some(last_processed) => StartOffset::Offset(last_processed.saturating_add(1)),
    };

    ResumeOffset::new(partition.clone(), start)
}
