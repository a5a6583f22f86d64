// ── Domain model ──
//
// Plain data shared by every component: adapters, roles, the Ethernet mode
// and the derived topology.

pub mod adapter;
pub mod mode;
pub mod role;
pub mod topology;

pub use adapter::{BusOrigin, MacAddress, PhysicalAdapter, bus_origin_from_device_path};
pub use mode::BridgeMode;
pub use role::{AssignmentPolicy, BindingEntry, InterfaceMap, LogicalRole, RoleBinding};
pub use topology::Topology;
