//! Descriptors for every resource type the API exposes.

use airsdk_core::{
    FieldDescriptor as F, FlushMode, Method, ModelSchema, Operations, VerbDescriptor as V,
};

pub static SIMULATION: ModelSchema = ModelSchema {
    name: "Simulation",
    path: "simulations",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("state").server_assigned().filterable(),
        F::scalar("creator").server_assigned().filterable(),
        F::scalar("auto_oob_enabled").nullable(),
        F::scalar("disable_auto_oob_dhcp").nullable(),
        F::scalar("auto_netq_enabled").nullable(),
        F::scalar("netq_username").nullable(),
        F::scalar("netq_password").nullable(),
        F::scalar("sleep_at").nullable(),
        F::scalar("expires_at").nullable(),
        F::scalar("documentation").nullable(),
        F::scalar("complete_checkpoint_count").server_assigned(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[
        V::instance("start", "start", Method::Patch),
        V::instance("shutdown", "shutdown", Method::Patch),
        V::instance("rebuild", "rebuild", Method::Patch),
        V::instance("enable_auto_oob", "enable-auto-oob", Method::Patch),
        V::instance("disable_auto_oob", "disable-auto-oob", Method::Patch),
        V::instance("enable_auto_netq", "enable-auto-netq", Method::Patch),
        V::instance("disable_auto_netq", "disable-auto-netq", Method::Patch),
        V::collection("clone", "clone", Method::Post),
    ],
    flush: FlushMode::Explicit,
};

pub static NODE: ModelSchema = ModelSchema {
    name: "Node",
    path: "simulations/nodes",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("name").filterable(),
        F::reference("simulation", "Simulation").filterable(),
        F::reference("image", "Image").filterable(),
        F::scalar("category").server_assigned().filterable(),
        F::scalar("state").server_assigned().filterable(),
        F::scalar("status_from_worker").server_assigned(),
        F::scalar("split_options").nullable(),
        F::scalar("cpu"),
        F::scalar("memory"),
        F::scalar("storage"),
        F::scalar("pos_x").nullable(),
        F::scalar("pos_y").nullable(),
        F::scalar("cdrom").nullable(),
        F::scalar("storage_pci").nullable(),
        F::scalar("attributes").nullable(),
        F::scalar("advanced").nullable(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[
        V::collection("bulk_assign", "bulk-assign", Method::Post),
        V::collection("bulk_reset", "bulk-reset", Method::Post),
        V::collection("bulk_rebuild", "bulk-rebuild", Method::Post),
    ],
    flush: FlushMode::Explicit,
};

pub static INTERFACE: ModelSchema = ModelSchema {
    name: "Interface",
    path: "simulations/nodes/interfaces",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::reference("node", "Node").filterable(),
        F::scalar("interface_type").filterable(),
        F::scalar("mac_address").nullable().filterable(),
        F::reference("connection", "Interface").nullable(),
        F::scalar("outbound"),
        F::scalar("attributes").nullable(),
    ],
    extra_filters: &["simulation"],
    operations: Operations::ALL,
    verbs: &[V::instance("set_connection", "set-connection", Method::Patch)],
    flush: FlushMode::Explicit,
};

pub static IMAGE: ModelSchema = ModelSchema {
    name: "Image",
    path: "images",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("created").server_assigned(),
        F::scalar("creator").server_assigned().filterable(),
        F::scalar("modified").server_assigned(),
        F::scalar("published").server_assigned().filterable(),
        F::scalar("includes_air_agent"),
        F::scalar("cpu_arch").filterable(),
        F::scalar("default_username").nullable(),
        F::scalar("default_password").nullable(),
        F::scalar("version").filterable(),
        F::scalar("mountpoint").nullable(),
        F::scalar("emulation_type").nullable(),
        F::scalar("emulation_version").nullable(),
        F::scalar("provider").nullable(),
        F::scalar("minimum_resources").nullable(),
        F::scalar("is_owned_by_client").server_assigned(),
        F::scalar("upload_status").server_assigned().filterable(),
        F::scalar("last_uploaded_at").server_assigned().nullable(),
        F::scalar("size").client_hint().nullable(),
        F::scalar("hash").client_hint().nullable(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[
        V::instance("publish", "publish", Method::Patch),
        V::instance("unpublish", "unpublish", Method::Patch),
        V::instance("clear_upload", "clear-upload", Method::Patch),
    ],
    flush: FlushMode::Explicit,
};

pub static SERVICE: ModelSchema = ModelSchema {
    name: "Service",
    path: "simulations/nodes/interfaces/services",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("node_port"),
        F::scalar("service_type").filterable(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::reference("interface", "Interface").filterable(),
        F::scalar("worker_port").server_assigned().nullable(),
        F::scalar("worker_fqdn").server_assigned().nullable(),
    ],
    extra_filters: &["simulation", "node"],
    operations: Operations::IMMUTABLE,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static SYSTEM: ModelSchema = ModelSchema {
    name: "System",
    path: "systems/nodes",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("name").server_assigned().filterable(),
        F::reference("simulation", "Simulation").server_assigned().nullable(),
        F::reference("image", "Image").server_assigned(),
        F::scalar("category").server_assigned().filterable(),
        F::scalar("cpu").server_assigned(),
        F::scalar("memory").server_assigned(),
        F::scalar("storage").server_assigned(),
        F::scalar("attributes").server_assigned().nullable(),
        F::scalar("split_options").server_assigned().nullable(),
    ],
    extra_filters: &[],
    operations: Operations::READ_ONLY,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static NODE_INSTRUCTION: ModelSchema = ModelSchema {
    name: "NodeInstruction",
    path: "simulations/nodes/instructions",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::reference("node", "Node").filterable(),
        F::scalar("data"),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("state").server_assigned().filterable(),
        F::scalar("run_again_on_rebuild"),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static SSH_KEY: ModelSchema = ModelSchema {
    name: "SshKey",
    path: "users/ssh-keys",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("created").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("public_key").lazy(),
        F::scalar("fingerprint").server_assigned(),
    ],
    extra_filters: &[],
    operations: Operations::IMMUTABLE,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static USER_CONFIG: ModelSchema = ModelSchema {
    name: "UserConfig",
    path: "userconfigs",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::scalar("kind").filterable(),
        F::scalar("content").nullable().lazy(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static ORGANIZATION: ModelSchema = ModelSchema {
    name: "Organization",
    path: "resource-budgets",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("org_display_name").server_assigned().filterable(),
        F::scalar("org_nca_id").server_assigned().filterable(),
        F::scalar("cpu").server_assigned(),
        F::scalar("memory").server_assigned(),
        F::scalar("disk_storage_total").server_assigned(),
        F::scalar("disk_storage_per_node").server_assigned(),
        F::scalar("image_storage").server_assigned(),
        F::scalar("userconfigs").server_assigned(),
        F::scalar("usage").server_assigned(),
    ],
    extra_filters: &[],
    operations: Operations::READ_ONLY,
    verbs: &[],
    flush: FlushMode::Explicit,
};

pub static MANIFEST: ModelSchema = ModelSchema {
    name: "Manifest",
    path: "manifests",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("org_name").server_assigned().filterable(),
        F::scalar("docker_run_parameters"),
        F::scalar("emulation_type").filterable(),
        F::scalar("platform_information"),
        F::reference("simulator_image", "Image").filterable(),
        F::scalar("simulator_resources"),
        F::scalar("artifacts_directory").nullable(),
        F::scalar("artifacts_directory_max_size_gb").nullable(),
        F::scalar("boot_group").nullable(),
        F::scalar("configure_node_properties").nullable(),
        F::scalar("configure_simulator").nullable(),
        F::scalar("simulation_engine_versions").nullable(),
        F::scalar("emulation_params").nullable(),
        F::scalar("port_mapping_required").nullable(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[],
    flush: FlushMode::Explicit,
};

/// `simulation` is only sent on create; the server reports the source as `demo`.
pub static MARKETPLACE_DEMO: ModelSchema = ModelSchema {
    name: "MarketplaceDemo",
    path: "marketplace/demos",
    primary_key: "id",
    fields: &[
        F::scalar("id").server_assigned(),
        F::scalar("name").filterable(),
        F::reference("demo", "Simulation").server_assigned().filterable(),
        F::reference("simulation", "Simulation").nullable(),
        F::scalar("created").server_assigned(),
        F::scalar("modified").server_assigned(),
        F::scalar("creator").server_assigned().filterable(),
        F::scalar("documentation").nullable(),
        F::scalar("tags").filterable(),
        F::scalar("like_count").server_assigned(),
        F::scalar("liked_by_client").server_assigned().filterable(),
        F::scalar("published").server_assigned().filterable(),
        F::scalar("description").nullable(),
        F::scalar("repo").nullable(),
        F::scalar("icon").nullable(),
    ],
    extra_filters: &[],
    operations: Operations::ALL,
    verbs: &[
        V::instance("publish", "publish", Method::Patch),
        V::instance("unpublish", "unpublish", Method::Patch),
        V::instance("provision", "provision", Method::Post),
    ],
    flush: FlushMode::Explicit,
};

static ALL: [&ModelSchema; 12] = [
    &SIMULATION,
    &NODE,
    &INTERFACE,
    &IMAGE,
    &SERVICE,
    &SYSTEM,
    &NODE_INSTRUCTION,
    &SSH_KEY,
    &USER_CONFIG,
    &ORGANIZATION,
    &MANIFEST,
    &MARKETPLACE_DEMO,
];

/// Every built-in schema.
pub fn all() -> &'static [&'static ModelSchema] {
    &ALL
}

/// Look a schema up by model name (`Simulation`) or endpoint path
/// (`simulations/nodes`). Names match case-insensitively.
pub fn find(name: &str) -> Option<&'static ModelSchema> {
    let trimmed = name.trim().trim_matches('/');
    ALL.iter()
        .copied()
        .find(|schema| schema.name.eq_ignore_ascii_case(trimmed) || schema.path == trimmed)
}
