//! Per-model legacy name tables.

use super::{
    AliasTable, CanonicalCall, EndpointVerb, FieldAlias, LegacyDefault, LegacyEndpointVerb,
    LegacyVerb, ReferenceChain, VerbRoute,
};

pub(super) static SIMULATION: AliasTable = AliasTable {
    model: "Simulation",
    fields: &[
        FieldAlias::rename("title", "name"),
        FieldAlias::rename("owner", "creator"),
        FieldAlias::rename("oob_auto_enabled", "auto_oob_enabled"),
        FieldAlias::rename("netq_auto_enabled", "auto_netq_enabled"),
        FieldAlias::presence("sleep", "sleep_at"),
        FieldAlias::presence("expires", "expires_at"),
    ],
    removed_fields: &["metadata", "organization", "preferred_worker", "write_ok"],
    chains: &[],
    states: &[
        ("LOADING", &["BOOTING", "PREPARE_BOOT", "REQUESTING", "PROVISIONING"]),
        ("LOADED", &["ACTIVE", "PREPARE_REBUILD", "REBUILDING"]),
        ("NEW", &["INACTIVE"]),
        ("STORED", &["INACTIVE"]),
        (
            "STORING",
            &["SHUTTING_DOWN", "PREPARE_SHUTDOWN", "SAVING", "PREPARE_PURGE", "PURGING"],
        ),
        ("SNAPSHOT", &["DEMO"]),
    ],
    verbs: &[
        LegacyVerb {
            name: "load",
            replacement: "invoke(\"start\")",
            route: VerbRoute::Canonical(CanonicalCall::plain("start")),
        },
        LegacyVerb {
            name: "store",
            replacement: "invoke(\"shutdown\")",
            route: VerbRoute::Canonical(CanonicalCall::plain("shutdown")),
        },
        LegacyVerb {
            name: "stop",
            replacement: "invoke(\"shutdown\")",
            route: VerbRoute::Canonical(CanonicalCall::plain("shutdown")),
        },
        LegacyVerb {
            name: "duplicate",
            replacement: "invoke(\"clone\")",
            route: VerbRoute::Canonical(CLONE),
        },
        LegacyVerb {
            name: "rebuild",
            replacement: "invoke(\"rebuild\")",
            route: VerbRoute::Canonical(CanonicalCall::plain("rebuild")),
        },
        LegacyVerb {
            name: "extend",
            replacement: "set(\"sleep_at\", ..)",
            route: VerbRoute::ShiftTimestamp {
                field: "sleep_at",
                hours: 12,
            },
        },
        LegacyVerb {
            name: "destroy",
            replacement: "delete()",
            route: VerbRoute::Destroy,
        },
        LegacyVerb {
            name: "control",
            replacement: "the dedicated verb for each action",
            route: VerbRoute::Dispatch {
                param: "action",
                actions: &[
                    ("load", "load"),
                    ("store", "store"),
                    ("destroy", "destroy"),
                    ("duplicate", "duplicate"),
                    ("rebuild", "rebuild"),
                    ("extend", "extend"),
                ],
                unknown_hint: "use start, shutdown, delete, clone, rebuild or set sleep_at",
            },
        },
        LegacyVerb {
            name: "preferences",
            replacement: "none",
            route: VerbRoute::Removed {
                hint: "simulation preferences are no longer exposed by the API",
            },
        },
    ],
    endpoint_verbs: &[
        LegacyEndpointVerb {
            name: "get_simulations",
            replacement: "list()",
            verb: EndpointVerb::List { renames: &[] },
        },
        LegacyEndpointVerb {
            name: "get_simulation",
            replacement: "get()",
            verb: EndpointVerb::Get {
                id_arg: "simulation_id",
            },
        },
        LegacyEndpointVerb {
            name: "create_simulation",
            replacement: "create()",
            verb: EndpointVerb::Create,
        },
        LegacyEndpointVerb {
            name: "update_simulation",
            replacement: "update()",
            verb: EndpointVerb::Update {
                id_arg: "simulation_id",
            },
        },
        LegacyEndpointVerb {
            name: "duplicate",
            replacement: "invoke(None, \"clone\", ..)",
            verb: EndpointVerb::Verb(CLONE),
        },
    ],
    create_renames: &[],
};

/// `start` became `attempt_start`; old callers never started the copy unless asked.
const CLONE: CanonicalCall = CanonicalCall {
    verb: "clone",
    self_param: Some("simulation"),
    renames: &[("start", "attempt_start")],
    defaults: &[("attempt_start", LegacyDefault::Bool(false))],
};

pub(super) static NODE: AliasTable = AliasTable {
    model: "Node",
    fields: &[
        FieldAlias::rename("os", "image"),
        FieldAlias::rename("simulation_id", "simulation"),
        FieldAlias::json_text("features", "advanced", &["uefi", "tpm"]),
    ],
    removed_fields: &[
        "boot_group",
        "console_password",
        "console_port",
        "console_url",
        "console_username",
        "interfaces",
        "last_worker",
        "original",
        "serial_port",
        "simx_ipv4",
        "system",
        "topology",
        "version",
        "worker",
        "emulated",
    ],
    chains: &[],
    states: &[],
    verbs: &[
        LegacyVerb {
            name: "reset",
            replacement: "invoke(\"bulk_reset\", ..)",
            route: VerbRoute::Batch {
                verb: "bulk_reset",
                list_key: "nodes",
            },
        },
        LegacyVerb {
            name: "rebuild",
            replacement: "invoke(\"bulk_rebuild\", ..)",
            route: VerbRoute::Batch {
                verb: "bulk_rebuild",
                list_key: "nodes",
            },
        },
        LegacyVerb {
            name: "control",
            replacement: "invoke(\"bulk_reset\" | \"bulk_rebuild\", ..)",
            route: VerbRoute::Dispatch {
                param: "action",
                actions: &[("reset", "reset"), ("rebuild", "rebuild")],
                unknown_hint: "only reset and rebuild are supported for nodes",
            },
        },
        LegacyVerb {
            name: "set_agent_key",
            replacement: "none",
            route: VerbRoute::Removed {
                hint: "agent keys are managed by the platform",
            },
        },
    ],
    endpoint_verbs: &[
        LegacyEndpointVerb {
            name: "get_nodes",
            replacement: "list()",
            verb: EndpointVerb::List {
                renames: &[("simulation_id", "simulation")],
            },
        },
        LegacyEndpointVerb {
            name: "get_simulation_nodes",
            replacement: "list()",
            verb: EndpointVerb::List { renames: &[] },
        },
        LegacyEndpointVerb {
            name: "update_simulation_node",
            replacement: "update()",
            verb: EndpointVerb::Update {
                id_arg: "simulation_node_id",
            },
        },
        LegacyEndpointVerb {
            name: "bulk_update_state",
            replacement: "none",
            verb: EndpointVerb::Removed {
                hint: "node state is driven by simulation verbs",
            },
        },
        LegacyEndpointVerb {
            name: "bulk_update_keydisk",
            replacement: "none",
            verb: EndpointVerb::Removed {
                hint: "key disks are no longer managed through the API",
            },
        },
    ],
    create_renames: &[],
};

pub(super) static INTERFACE: AliasTable = AliasTable {
    model: "Interface",
    fields: &[],
    removed_fields: &[
        "link_up",
        "internal_ipv4",
        "full_ipv6",
        "prefix_ipv6",
        "port_number",
        "preserve_mac",
        "link",
        "url",
        "index",
        "link_id",
        "original",
        "services",
    ],
    chains: &[ReferenceChain {
        legacy: "simulation",
        path: &["node", "simulation"],
    }],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[],
};

pub(super) static IMAGE: AliasTable = AliasTable {
    model: "Image",
    fields: &[FieldAlias::rename("agent_enabled", "includes_air_agent")],
    removed_fields: &[
        "archived",
        "bios",
        "bus",
        "console_support",
        "features",
        "organization",
        "simx",
        "uploader",
        "can_edit",
        "organization_name",
        "uploader_username",
        "contact",
    ],
    chains: &[],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[],
};

pub(super) static SERVICE: AliasTable = AliasTable {
    model: "Service",
    fields: &[
        FieldAlias::rename("dest_port", "node_port"),
        FieldAlias::rename("src_port", "worker_port"),
        FieldAlias::rename("host", "worker_fqdn"),
        FieldAlias::rename("simulation_id", "simulation"),
    ],
    removed_fields: &[],
    chains: &[ReferenceChain {
        legacy: "simulation",
        path: &["interface", "node", "simulation"],
    }],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[
        LegacyEndpointVerb {
            name: "get_services",
            replacement: "list()",
            verb: EndpointVerb::List { renames: &[] },
        },
        LegacyEndpointVerb {
            name: "get_service",
            replacement: "get()",
            verb: EndpointVerb::Get {
                id_arg: "service_id",
            },
        },
        LegacyEndpointVerb {
            name: "create_service",
            replacement: "create()",
            verb: EndpointVerb::Create,
        },
    ],
    create_renames: &[],
};

pub(super) static ORGANIZATION: AliasTable = AliasTable {
    model: "Organization",
    fields: &[
        FieldAlias::rename("name", "org_display_name"),
        FieldAlias::rename("storage", "disk_storage_total"),
    ],
    removed_fields: &[
        "member_count",
        "resource_budget",
        "cpu_used",
        "memory_used",
        "storage_used",
        "simulations",
        "simulations_used",
        "image_uploads",
        "image_uploads_used",
        "userconfigs_used",
    ],
    chains: &[],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[],
};

pub(super) static MANIFEST: AliasTable = AliasTable {
    model: "Manifest",
    fields: &[FieldAlias::read_only("organization", "org_name")],
    removed_fields: &["owner"],
    chains: &[],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[],
};

pub(super) static MARKETPLACE_DEMO: AliasTable = AliasTable {
    model: "MarketplaceDemo",
    fields: &[
        FieldAlias::rename("liked_by_account", "liked_by_client"),
        FieldAlias::rename("owner_email", "creator"),
        FieldAlias::rename("owner", "creator"),
        FieldAlias::rename("snapshot", "demo"),
    ],
    removed_fields: &[],
    chains: &[],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[("snapshot", "simulation")],
};

/// Endpoint aliases every model accepts.
pub(super) static COMMON_ENDPOINT_VERBS: &[LegacyEndpointVerb] = &[
    LegacyEndpointVerb {
        name: "put",
        replacement: "patch()",
        verb: EndpointVerb::Update { id_arg: "id" },
    },
    LegacyEndpointVerb {
        name: "full_update",
        replacement: "update()",
        verb: EndpointVerb::Update { id_arg: "id" },
    },
];

/// Top-level calls that no longer exist, with what to use instead.
pub(super) static REMOVED_API_CALLS: &[(&str, &str)] =
    &[("breakouts", "use the interface breakout operations instead")];

pub(super) static EMPTY: AliasTable = AliasTable {
    model: "*",
    fields: &[],
    removed_fields: &[],
    chains: &[],
    states: &[],
    verbs: &[],
    endpoint_verbs: &[],
    create_renames: &[],
};

pub(super) static ALL: [&AliasTable; 8] = [
    &SIMULATION,
    &NODE,
    &INTERFACE,
    &IMAGE,
    &SERVICE,
    &ORGANIZATION,
    &MANIFEST,
    &MARKETPLACE_DEMO,
];
