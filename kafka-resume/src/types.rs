use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rdkafka::topic_partition_list::TopicPartitionListElem;
use rdkafka::Offset;

use crate::error::ResumeError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    topic: String,
    partition_number: i32,
}

impl Partition {
    pub fn new(topic: impl Into<String>, partition_number: i32) -> Self {
        Self {
            topic: topic.into(),
            partition_number,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_number(&self) -> i32 {
        self.partition_number
    }

    /// Rejects identities the broker should never hand out.
    pub fn validate(&self) -> Result<(), ResumeError> {
        if self.topic.is_empty() {
            return Err(ResumeError::malformed(self, "empty topic name"));
        }
        if self.partition_number < 0 {
            return Err(ResumeError::malformed(self, "negative partition index"));
        }
        Ok(())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition_number)
    }
}

impl TryFrom<TopicPartitionListElem<'_>> for Partition {
    type Error = ResumeError;

    fn try_from(elem: TopicPartitionListElem<'_>) -> Result<Self, Self::Error> {
        let partition = Self::new(elem.topic(), elem.partition());
        partition.validate()?;
        Ok(partition)
    }
}

/// Last processed position for a partition, as recorded by a position store.
/// `offset == None` means nothing was ever recorded, which differs from `Some(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    partition: Partition,
    offset: Option<i64>,
}

impl Position {
    pub fn new(partition: Partition, offset: Option<i64>) -> Self {
        Self { partition, offset }
    }

    pub fn unset(partition: Partition) -> Self {
        Self::new(partition, None)
    }

    pub fn at(partition: Partition, offset: i64) -> Self {
        Self::new(partition, Some(offset))
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn is_unset(&self) -> bool {
        self.offset.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartOffset {
    /// Replay from the oldest retained message
    Beginning,
    Offset(i64),
}

impl From<StartOffset> for Offset {
    fn from(start: StartOffset) -> Self {
        match start {
            StartOffset::Beginning => Offset::Beginning,
            StartOffset::Offset(offset) => Offset::Offset(offset),
        }
    }
}

impl fmt::Display for StartOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOffset::Beginning => f.write_str("beginning"),
            StartOffset::Offset(offset) => write!(f, "{offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeOffset {
    partition: Partition,
    start: StartOffset,
}

impl ResumeOffset {
    pub fn new(partition: Partition, start: StartOffset) -> Self {
        Self { partition, start }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn topic(&self) -> &str {
        self.partition.topic()
    }

    pub fn partition_number(&self) -> i32 {
        self.partition.partition_number()
    }

    pub fn start(&self) -> StartOffset {
        self.start
    }
}

/// A partition being taken away, with the last offset the client knew about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevokedPartition {
    partition: Partition,
    last_known_offset: Option<i64>,
}

impl RevokedPartition {
    pub fn new(partition: Partition, last_known_offset: Option<i64>) -> Self {
        Self {
            partition,
            last_known_offset,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn last_known_offset(&self) -> Option<i64> {
        self.last_known_offset
    }
}

impl From<TopicPartitionListElem<'_>> for RevokedPartition {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        let last_known_offset = match elem.offset() {
            Offset::Offset(offset) => Some(offset),
            _ => None,
        };
        Self::new(
            Partition::new(elem.topic(), elem.partition()),
            last_known_offset,
        )
    }
}

/// All partition indices of one topic taking part in a rebalance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitions {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl fmt::Display for TopicPartitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.topic, self.partitions)
    }
}

/// Groups partitions by topic. Topics come out sorted, indices ascending and
/// deduplicated, so every input partition lands in exactly one group.
pub fn group_by_topic<'a, I>(partitions: I) -> Vec<TopicPartitions>
where
    I: IntoIterator<Item = &'a Partition>,
{
    let mut by_topic: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for partition in partitions {
        by_topic
            .entry(partition.topic())
            .or_default()
            .insert(partition.partition_number());
    }

    by_topic
        .into_iter()
        .map(|(topic, partitions)| TopicPartitions {
            topic: topic.to_string(),
            partitions: partitions.into_iter().collect(),
        })
        .collect()
}

/// Joins grouped topics into a single log field, e.g. `orders=[0, 1] users=[3]`
pub fn format_topics(groups: &[TopicPartitions]) -> String {
    groups
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::TopicPartitionList;

    #[test]
    fn test_group_by_topic_keeps_every_partition_once() {
        let partitions = vec![
            Partition::new("t2", 1),
            Partition::new("t1", 2),
            Partition::new("t1", 0),
            Partition::new("t2", 0),
            Partition::new("t1", 1),
            Partition::new("t1", 0),
        ];

        let groups = group_by_topic(&partitions);

        assert_eq!(
            groups,
            vec![
                TopicPartitions {
                    topic: "t1".to_string(),
                    partitions: vec![0, 1, 2],
                },
                TopicPartitions {
                    topic: "t2".to_string(),
                    partitions: vec![0, 1],
                },
            ]
        );
    }

    #[test]
    fn test_group_by_topic_empty() {
        assert!(group_by_topic(&Vec::<Partition>::new()).is_empty());
    }

    #[test]
    fn test_format_topics() {
        let groups = group_by_topic(&[
            Partition::new("orders", 1),
            Partition::new("orders", 0),
            Partition::new("users", 3),
        ]);
        assert_eq!(format_topics(&groups), "orders=[0, 1] users=[3]");
    }

    #[test]
    fn test_partition_validation() {
        assert!(Partition::new("orders", 0).validate().is_ok());
        assert!(matches!(
            Partition::new("orders", -1).validate(),
            Err(ResumeError::MalformedAssignment { .. })
        ));
        assert!(matches!(
            Partition::new("", 0).validate(),
            Err(ResumeError::MalformedAssignment { .. })
        ));
    }

    #[test]
    fn test_start_offset_into_rdkafka_offset() {
        assert_eq!(Offset::from(StartOffset::Beginning), Offset::Beginning);
        assert_eq!(Offset::from(StartOffset::Offset(42)), Offset::Offset(42));
    }

    #[test]
    fn test_conversions_from_partition_list() {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset("orders", 0, Offset::Offset(50)).unwrap();
        list.add_partition_offset("orders", 1, Offset::Invalid).unwrap();

        let partitions: Vec<Partition> = list
            .elements()
            .into_iter()
            .map(Partition::try_from)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            partitions,
            vec![Partition::new("orders", 0), Partition::new("orders", 1)]
        );

        let revoked: Vec<RevokedPartition> = list
            .elements()
            .into_iter()
            .map(RevokedPartition::from)
            .collect();
        assert_eq!(revoked[0].last_known_offset(), Some(50));
        assert_eq!(revoked[1].last_known_offset(), None);
    }
}
