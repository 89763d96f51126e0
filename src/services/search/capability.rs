//! Column capability registry.
//!
//! The only place table/column search metadata lives. If a column is not
//! declared here it is not searchable, and every declaration carries the
//! gates the conjunction planner enforces (`isolated_ok`, `conjunction_only`).
//!
//! The registry is built once at process start and shared read-only.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::operators::Operator;

/// Closed vocabulary of entity types the extraction pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    PartNumber,
    EquipmentCode,
    SerialNumber,
    FaultCode,
    PoNumber,
    WoNumber,
    EquipmentName,
    PartName,
    SupplierName,
    Location,
    Manufacturer,
    ModelNumber,
    Symptom,
    FreeText,
}

/// Entity strength drives the conjunction gates and lane selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

impl EntityType {
    pub fn strength(self) -> Strength {
        match self {
            EntityType::PartNumber
            | EntityType::EquipmentCode
            | EntityType::SerialNumber
            | EntityType::FaultCode
            | EntityType::PoNumber
            | EntityType::WoNumber => Strength::Strong,
            EntityType::EquipmentName
            | EntityType::PartName
            | EntityType::SupplierName
            | EntityType::Location
            | EntityType::Manufacturer
            | EntityType::ModelNumber => Strength::Medium,
            EntityType::Symptom | EntityType::FreeText => Strength::Weak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    TextArray,
    Jsonb,
    Numeric,
}

/// What a column can do.
#[derive(Debug, Clone)]
pub struct ColumnCapability {
    pub name: String,
    pub datatype: ColumnType,
    pub operators: Vec<Operator>,
    pub entity_types: Vec<EntityType>,
    /// Can be queried without an anchor term.
    pub isolated_ok: bool,
    /// May only appear as a non-leading term inside an AND conjunction.
    pub conjunction_only: bool,
    /// Included in the default SELECT list.
    pub select_default: bool,
    /// Primary semantic home for its entity types (drives +2.0 bias).
    pub primary_home: bool,
    /// Eligible for the weak-only degraded search path.
    pub primary_text: bool,
    /// Keys reachable through JSONB_PATH_ILIKE.
    pub json_keys: Option<Vec<String>>,
}

impl ColumnCapability {
    fn new(name: &str, datatype: ColumnType, operators: &[Operator], entity_types: &[EntityType]) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            operators: operators.to_vec(),
            entity_types: entity_types.to_vec(),
            isolated_ok: true,
            conjunction_only: false,
            select_default: true,
            primary_home: false,
            primary_text: false,
            json_keys: None,
        }
    }

    fn primary(mut self) -> Self {
        self.primary_home = true;
        self
    }

    fn text_home(mut self) -> Self {
        self.primary_text = true;
        self
    }

    fn conjunction_only(mut self) -> Self {
        self.conjunction_only = true;
        self
    }

    fn anchored(mut self) -> Self {
        self.isolated_ok = false;
        self
    }

    fn hidden(mut self) -> Self {
        self.select_default = false;
        self
    }

    fn json_keys(mut self, keys: &[&str]) -> Self {
        self.json_keys = Some(keys.iter().map(|k| (*k).to_string()).collect());
        self
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }

    pub fn serves(&self, et: EntityType) -> bool {
        self.entity_types.contains(&et)
    }
}

/// Complete capability declaration for a table.
#[derive(Debug, Clone)]
pub struct TableCapability {
    pub name: String,
    /// Object type recorded on result rows and link suggestions.
    pub object_type: String,
    pub yacht_id_column: String,
    pub primary_key: String,
    pub columns: BTreeMap<String, ColumnCapability>,
    pub default_select: Vec<String>,
    pub default_limit: u32,
    pub default_order: Option<String>,
    pub required_filters: Vec<String>,
}

impl TableCapability {
    pub fn column(&self, name: &str) -> Option<&ColumnCapability> {
        self.columns.get(name)
    }

    /// Columns serving an entity type, primary homes first.
    pub fn columns_for(&self, et: EntityType) -> Vec<&ColumnCapability> {
        let mut cols: Vec<&ColumnCapability> =
            self.columns.values().filter(|c| c.serves(et)).collect();
        cols.sort_by_key(|c| (!c.primary_home, c.name.clone()));
        cols
    }
}

/// One entry of a `by_entity_type` lookup.
#[derive(Debug, Clone)]
pub struct ColumnRef<'a> {
    pub table: &'a TableCapability,
    pub column: &'a ColumnCapability,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("table {0} declares no tenant column")]
    MissingTenantColumn(String),
    #[error("table {0} does not list the tenant column in required_filters")]
    TenantFilterNotRequired(String),
}

/// Process-wide table registry, immutable after initialization.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    tables: BTreeMap<String, TableCapability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Rejects declarations without a tenant column: every
    /// searchable table must be tenant-scoped.
    pub fn insert(&mut self, table: TableCapability) -> Result<(), RegistryError> {
        if table.yacht_id_column.trim().is_empty() {
            return Err(RegistryError::MissingTenantColumn(table.name));
        }
        if !table.required_filters.contains(&table.yacht_id_column) {
            return Err(RegistryError::TenantFilterNotRequired(table.name));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableCapability> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableCapability> {
        self.tables.values()
    }

    /// All columns across the registry that serve an entity type.
    pub fn columns_for_entity(&self, et: EntityType) -> Vec<ColumnRef<'_>> {
        let mut refs = Vec::new();
        for table in self.tables.values() {
            for column in table.columns.values() {
                if column.serves(et) {
                    refs.push(ColumnRef { table, column });
                }
            }
        }
        refs
    }

    /// Entity types with no `isolated_ok` home anywhere. Any type listed here
    /// degrades to weak-entity search; surfaced at startup so routing gaps
    /// are visible before a zero-result report lands.
    pub fn verify_entity_coverage(&self) -> Vec<EntityType> {
        use EntityType::*;
        let all = [
            PartNumber, EquipmentCode, SerialNumber, FaultCode, PoNumber, WoNumber,
            EquipmentName, PartName, SupplierName, Location, Manufacturer, ModelNumber,
            Symptom, FreeText,
        ];
        all.into_iter()
            .filter(|et| {
                !self
                    .columns_for_entity(*et)
                    .iter()
                    .any(|r| r.column.isolated_ok && !r.column.conjunction_only)
            })
            .collect()
    }

    /// The built-in production registry.
    pub fn builtin() -> &'static CapabilityRegistry {
        static REGISTRY: Lazy<CapabilityRegistry> =
            Lazy::new(|| build_builtin().expect("builtin capability registry is valid"));
        &REGISTRY
    }
}

fn table(
    name: &str,
    object_type: &str,
    primary_key: &str,
    default_limit: u32,
    default_order: Option<&str>,
    columns: Vec<ColumnCapability>,
) -> TableCapability {
    let default_select: Vec<String> = std::iter::once(primary_key.to_string())
        .chain(columns.iter().filter(|c| c.select_default).map(|c| c.name.clone()))
        .take(7)
        .collect();
    TableCapability {
        name: name.to_string(),
        object_type: object_type.to_string(),
        yacht_id_column: "yacht_id".to_string(),
        primary_key: primary_key.to_string(),
        columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        default_select,
        default_limit,
        default_order: default_order.map(str::to_string),
        required_filters: vec!["yacht_id".to_string()],
    }
}

fn build_builtin() -> Result<CapabilityRegistry, RegistryError> {
    use ColumnType::*;
    use EntityType::*;
    use Operator::*;

    let mut reg = CapabilityRegistry::new();

    reg.insert(table(
        "pms_parts",
        "part",
        "id",
        20,
        Some("name"),
        vec![
            ColumnCapability::new("part_number", Text, &[Exact, Ilike, Trigram], &[PartNumber])
                .primary(),
            ColumnCapability::new("name", Text, &[Exact, Ilike, Trigram], &[PartName, FreeText])
                .primary()
                .text_home(),
            ColumnCapability::new("manufacturer", Text, &[Exact, Ilike], &[Manufacturer]),
            ColumnCapability::new("model", Text, &[Exact, Ilike], &[ModelNumber]),
            ColumnCapability::new("location", Text, &[Exact, Ilike], &[Location]).conjunction_only(),
            ColumnCapability::new("updated_at", Text, &[], &[]),
            ColumnCapability::new("oem_number", Text, &[Exact, Ilike], &[PartNumber]).hidden(),
            ColumnCapability::new("description", Text, &[Ilike, Trigram], &[FreeText])
                .anchored()
                .hidden(),
        ],
    ))?;

    reg.insert(table(
        "v_inventory",
        "inventory_item",
        "id",
        20,
        None,
        vec![
            ColumnCapability::new("part_number", Text, &[Exact, Ilike], &[PartNumber]),
            ColumnCapability::new("name", Text, &[Ilike, Trigram], &[PartName, FreeText]).text_home(),
            ColumnCapability::new("location", Text, &[Exact, Ilike], &[Location]).primary(),
            // Stock levels are filterable through lookups, never term-matched.
            ColumnCapability::new("quantity_on_hand", Numeric, &[Range, In], &[]),
        ],
    ))?;

    reg.insert(table(
        "pms_equipment",
        "equipment",
        "id",
        20,
        Some("name"),
        vec![
            ColumnCapability::new("code", Text, &[Exact, Ilike], &[EquipmentCode, EquipmentName])
                .primary(),
            ColumnCapability::new(
                "name",
                Text,
                &[Exact, Ilike, Trigram],
                &[EquipmentName, FreeText],
            )
            .primary()
            .text_home(),
            ColumnCapability::new("serial_number", Text, &[Exact, Ilike], &[SerialNumber]).primary(),
            ColumnCapability::new("manufacturer", Text, &[Exact, Ilike], &[Manufacturer]),
            ColumnCapability::new("model", Text, &[Exact, Ilike], &[ModelNumber]),
            ColumnCapability::new("updated_at", Text, &[], &[]),
            ColumnCapability::new("attributes", Jsonb, &[JsonbPathIlike], &[ModelNumber])
                .anchored()
                .hidden()
                .json_keys(&["model", "rating", "fuel_type"]),
        ],
    ))?;

    reg.insert(table(
        "pms_faults",
        "fault",
        "id",
        20,
        Some("reported_at DESC"),
        vec![
            ColumnCapability::new("fault_code", Text, &[Exact, Ilike], &[FaultCode]).primary(),
            ColumnCapability::new("description", Text, &[Ilike, Trigram], &[Symptom, FreeText])
                .text_home(),
            ColumnCapability::new("status", Text, &[], &[]),
            ColumnCapability::new("reported_at", Text, &[], &[]),
        ],
    ))?;

    reg.insert(table(
        "search_fault_code_catalog",
        "fault_code",
        "id",
        20,
        None,
        vec![
            ColumnCapability::new("fault_code", Text, &[Exact, Ilike, Trigram], &[FaultCode])
                .primary(),
            ColumnCapability::new("title", Text, &[Ilike, Trigram], &[Symptom, FreeText])
                .text_home(),
        ],
    ))?;

    reg.insert(table(
        "pms_work_orders",
        "work_order",
        "id",
        20,
        Some("updated_at DESC"),
        vec![
            ColumnCapability::new("wo_number", Text, &[Exact, Ilike], &[WoNumber]).primary(),
            ColumnCapability::new("title", Text, &[Ilike, Trigram], &[FreeText, Symptom])
                .text_home(),
            ColumnCapability::new("vendor_name", Text, &[Exact, Ilike], &[SupplierName]),
            ColumnCapability::new("status", Text, &[], &[]),
            ColumnCapability::new("updated_at", Text, &[], &[]),
            ColumnCapability::new("vendor_hash", Text, &[Exact], &[]).hidden(),
            ColumnCapability::new("equipment_id", Text, &[Exact], &[]).hidden(),
        ],
    ))?;

    reg.insert(table(
        "purchase_orders",
        "purchase_order",
        "id",
        20,
        Some("created_at DESC"),
        vec![
            ColumnCapability::new("po_number", Text, &[Exact, Ilike], &[PoNumber]).primary(),
            ColumnCapability::new("vendor_name", Text, &[Exact, Ilike, Trigram], &[SupplierName])
                .primary(),
            ColumnCapability::new("status", Text, &[], &[]),
            ColumnCapability::new("created_at", Text, &[], &[]),
        ],
    ))?;

    reg.insert(table(
        "doc_metadata",
        "document",
        "id",
        20,
        None,
        vec![
            ColumnCapability::new("title", Text, &[Ilike, Trigram], &[FreeText]).primary().text_home(),
            ColumnCapability::new("tags", TextArray, &[ArrayAnyIlike], &[FreeText, EquipmentName])
                .anchored()
                .hidden(),
        ],
    ))?;

    reg.insert(table(
        "graph_nodes",
        "graph_node",
        "id",
        20,
        None,
        vec![
            ColumnCapability::new(
                "label",
                Text,
                &[Exact, Ilike, Trigram],
                &[EquipmentName, PartName, FreeText],
            )
            .text_home(),
            ColumnCapability::new("node_type", Text, &[Exact], &[FreeText])
                .conjunction_only()
                .hidden(),
        ],
    ))?;

    reg.insert(table(
        "symptom_aliases",
        "symptom",
        "id",
        20,
        None,
        vec![
            ColumnCapability::new("alias", Text, &[Ilike, Trigram], &[Symptom]).primary().text_home(),
            ColumnCapability::new("canonical_symptom", Text, &[Exact, Ilike], &[Symptom]),
        ],
    ))?;

    reg.insert(table(
        "email_threads",
        "email_thread",
        "id",
        20,
        Some("last_message_at DESC"),
        vec![
            ColumnCapability::new("subject", Text, &[Ilike, Trigram], &[FreeText]).text_home(),
            ColumnCapability::new("sender_domain", Text, &[Exact, Ilike], &[SupplierName]),
        ],
    ))?;

    Ok(reg)
}
