//! Built-in introspection checks.

use std::fmt;

use crate::{
    descriptors::MetricDescriptor,
    error::{DescriptorError, ScanError},
    row::{map_row, Ignored, Observation, Row},
    version::ServerVersion,
    ScanRow,
};

const NAMESPACE: &str = "mysql";
const SUBSYSTEM: &str = "dba";
const MIN_VERSION: ServerVersion = ServerVersion::new(5, 1, 0);

#[derive(Debug, ScanRow)]
#[scan(crate = crate)]
struct DisabledEventRow {
    schema: String,
    event: String,
}

/// `SHOW OPEN TABLES` returns `Database`, `Table`, `In_use` and `Name_locked` columns.
#[derive(Debug, ScanRow)]
#[scan(crate = crate)]
struct OpenTableRow {
    schema: String,
    table: String,
    #[scan(value)]
    in_use: u64,
    #[scan(skip)]
    _name_locked: Ignored,
}

#[derive(Debug, ScanRow)]
#[scan(crate = crate)]
struct UsingPartitionRow {
    schema: String,
    table: String,
    partition: String,
    /// Upper bound of the last partition as a Unix timestamp.
    #[scan(value)]
    bound: f64,
}

#[derive(Debug, ScanRow)]
#[scan(crate = crate)]
struct PartitionToRemoveRow {
    schema: String,
    table: String,
    partition: String,
    /// Data and index size in MiB.
    size: f64,
    #[scan(value)]
    bound: f64,
}

#[derive(Debug, ScanRow)]
#[scan(crate = crate)]
struct RoutineMissingRow {
    schema: String,
}

type RowMapper = fn(&Row) -> Result<Observation, ScanError>;

#[derive(Debug)]
struct CheckDefinition {
    name: &'static str,
    help: &'static str,
    query: &'static str,
    metric_name: &'static str,
    metric_help: &'static str,
    labels: &'static [&'static str],
    map_row: RowMapper,
}

static DISABLED_EVENTS_ON_ACTIVE_NODE: CheckDefinition = CheckDefinition {
    name: "disabled_events_on_active_node",
    help: "Collect events that are not enabled on a writable (active) node",
    query: include_str!("sql/disabled_events_on_active_node.sql"),
    metric_name: "disabled_events_on_active_node",
    metric_help: "Schemas and events whose status is not ENABLED on the active node.",
    labels: DisabledEventRow::LABELS,
    map_row: map_row::<DisabledEventRow>,
};

static OPEN_TABLES: CheckDefinition = CheckDefinition {
    name: "open_tables",
    help: "Collect tables that are currently in use",
    query: include_str!("sql/open_tables.sql"),
    metric_name: "open_tables",
    metric_help: "Number of table locks or lock requests for tables that are currently in use.",
    labels: OpenTableRow::LABELS,
    map_row: map_row::<OpenTableRow>,
};

static USING_PARTITIONS: CheckDefinition = CheckDefinition {
    name: "using_partitions",
    help: "Collect partitioned tables whose last partition ends within two months",
    query: include_str!("sql/using_partitions.sql"),
    metric_name: "using_partitions",
    metric_help: "Upper bound of the last partition for range-partitioned tables, as a Unix timestamp.",
    labels: UsingPartitionRow::LABELS,
    map_row: map_row::<UsingPartitionRow>,
};

static PARTITIONS_TO_REMOVE: CheckDefinition = CheckDefinition {
    name: "partitions_to_remove",
    help: "Collect partitions older than 3 months",
    query: include_str!("sql/partitions_to_remove.sql"),
    metric_name: "partitions_to_remove",
    metric_help: "Upper bound of partitions older than 3 months, as a Unix timestamp.",
    labels: PartitionToRemoveRow::LABELS,
    map_row: map_row::<PartitionToRemoveRow>,
};

static ROUTINE_MISSING: CheckDefinition = CheckDefinition {
    name: "routine_missing",
    help: "Collect partitioned schemas without the addNewPartition routine",
    query: include_str!("sql/routine_missing.sql"),
    metric_name: "routine_missing",
    metric_help: "Schemas with range-partitioned tables that miss the addNewPartition routine.",
    labels: RoutineMissingRow::LABELS,
    map_row: map_row::<RoutineMissingRow>,
};

/// Built-in introspection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    /// Events with a status other than `ENABLED` on a node that is not read-only.
    DisabledEventsOnActiveNode,
    /// Tables that are currently in use, with the number of locks as the value.
    OpenTables,
    /// Range-partitioned tables whose last partition bound is less than two months ahead.
    UsingPartitions,
    /// Partitions with a bound more than 3 months in the past, labeled with their size in MiB.
    PartitionsToRemove,
    /// Schemas with range-partitioned tables that miss the `addNewPartition` stored routine.
    RoutineMissing,
}

impl Check {
    /// All built-in checks.
    pub const ALL: [Self; 5] = [
        Self::DisabledEventsOnActiveNode,
        Self::OpenTables,
        Self::UsingPartitions,
        Self::PartitionsToRemove,
        Self::RoutineMissing,
    ];

    /// Resolves a check by its name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|check| check.name() == name)
    }

    fn definition(self) -> &'static CheckDefinition {
        match self {
            Self::DisabledEventsOnActiveNode => &DISABLED_EVENTS_ON_ACTIVE_NODE,
            Self::OpenTables => &OPEN_TABLES,
            Self::UsingPartitions => &USING_PARTITIONS,
            Self::PartitionsToRemove => &PARTITIONS_TO_REMOVE,
            Self::RoutineMissing => &ROUTINE_MISSING,
        }
    }

    /// Returns the name of this check, which is used to enable it and as the scraper name.
    pub fn name(self) -> &'static str {
        self.definition().name
    }

    /// Returns a short description of this check.
    pub fn help(self) -> &'static str {
        self.definition().help
    }

    /// Returns the minimum server version supporting this check.
    pub fn min_version(self) -> ServerVersion {
        MIN_VERSION
    }

    /// Returns the SQL query executed by this check.
    pub fn query(self) -> &'static str {
        self.definition().query
    }

    /// Builds the descriptor of the metric emitted by this check.
    pub(crate) fn descriptor(self) -> Result<MetricDescriptor, DescriptorError> {
        let definition = self.definition();
        MetricDescriptor::new(
            NAMESPACE,
            SUBSYSTEM,
            definition.metric_name,
            definition.metric_help,
            definition.labels,
        )
    }

    pub(crate) fn map_row(self, row: &Row) -> Result<Observation, ScanError> {
        (self.definition().map_row)(row)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}
