//! Resource Registry - static resource descriptors
//!
//! Every resource the gateway exposes is described by one [`ResourceDef`]:
//! its action set, per-action required fields, argument mapping, compact
//! formatter fields and related-resource hints. The descriptors are plain
//! statics, interpreted by the generic dispatcher.

use serde_json::{json, Value};

/// Kind of resource, one variant per descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Servers,
    Sites,
    Deployments,
    Databases,
    DatabaseUsers,
    Certificates,
    Daemons,
    FirewallRules,
    ScheduledJobs,
    SshKeys,
    Env,
    Nginx,
    Recipes,
    User,
}

/// Where a resource lives in the API tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Top-level collection (/servers, /recipes)
    Root,
    /// Under a server (/servers/{server_id}/...)
    Server,
    /// Under a site (/servers/{server_id}/sites/{site_id}/...)
    Site,
}

/// Action definition
#[derive(Debug, Clone, Copy)]
pub struct ActionDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Mandatory argument names, checked before any outbound call
    pub required: &'static [&'static str],
    pub read_only: bool,
    /// Handled by the deploy orchestrator instead of a single executor call
    pub long_running: bool,
}

const fn read(name: &'static str, description: &'static str, required: &'static [&'static str]) -> ActionDef {
    ActionDef {
        name,
        description,
        required,
        read_only: true,
        long_running: false,
    }
}

const fn write(name: &'static str, description: &'static str, required: &'static [&'static str]) -> ActionDef {
    ActionDef {
        name,
        description,
        required,
        read_only: false,
        long_running: false,
    }
}

/// Declarative transform from envelope arguments to executor parameters
#[derive(Debug, Clone, Copy)]
pub enum ArgMapping {
    /// Move a field to a different parameter name
    Rename { from: &'static str, to: &'static str },
    /// Split a comma-separated string into a list (numeric items become numbers)
    SplitList(&'static str),
}

/// Where a related-resource hint takes a value from
#[derive(Debug, Clone, Copy)]
pub enum HintSource {
    /// Field of the returned item
    Item(&'static str),
    /// Field of the call's own arguments
    Args(&'static str),
}

/// Follow-up suggestion attached to `get` responses
#[derive(Debug, Clone, Copy)]
pub struct RelatedDef {
    pub resource: &'static str,
    pub action: &'static str,
    pub args: &'static [(&'static str, HintSource)],
}

/// Fields used by the compact text formatter
#[derive(Debug, Clone, Copy)]
pub struct CompactFormat {
    pub title_field: &'static str,
    pub fields: &'static [(&'static str, &'static str)],
}

/// Resource definition
#[derive(Debug, Clone, Copy)]
pub struct ResourceDef {
    pub kind: ResourceKind,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub scope: Scope,
    /// Response wrapper keys: (collection, single item)
    pub response_keys: (&'static str, &'static str),
    /// Field matched by the resolver; `None` when the kind is not resolvable
    pub name_field: Option<&'static str>,
    pub actions: &'static [ActionDef],
    pub mappings: &'static [(&'static str, ArgMapping)],
    pub compact: CompactFormat,
    pub related: &'static [RelatedDef],
}

impl ResourceDef {
    pub fn action(&self, name: &str) -> Option<&'static ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name).collect()
    }

    pub fn is_resolvable(&self) -> bool {
        self.name_field.is_some()
    }

    /// Machine-readable action/field description
    pub fn schema(&self) -> Value {
        json!({
            "resource": self.name,
            "description": self.description,
            "actions": self.actions.iter().map(|a| json!({
                "name": a.name,
                "description": a.description,
                "required": a.required,
                "read_only": a.read_only,
            })).collect::<Vec<_>>(),
        })
    }

    /// Human documentation for the resource
    pub fn help(&self) -> String {
        let mut out = format!("{} ({})\n{}\n\nActions:\n", self.display_name, self.name, self.description);
        for action in self.actions {
            let required = if action.required.is_empty() {
                String::new()
            } else {
                format!(" [requires: {}]", action.required.join(", "))
            };
            out.push_str(&format!("  {} - {}{}\n", action.name, action.description, required));
        }
        out.push_str("  help - Show this documentation\n");
        out.push_str("  schema - Machine-readable action and field list\n");
        if self.is_resolvable() {
            out.push_str("\nNames are accepted in place of numeric ids and resolved automatically.\n");
        }
        out
    }
}

impl ResourceKind {
    pub const ALL: &'static [ResourceKind] = &[
        ResourceKind::Servers,
        ResourceKind::Sites,
        ResourceKind::Deployments,
        ResourceKind::Databases,
        ResourceKind::DatabaseUsers,
        ResourceKind::Certificates,
        ResourceKind::Daemons,
        ResourceKind::FirewallRules,
        ResourceKind::ScheduledJobs,
        ResourceKind::SshKeys,
        ResourceKind::Env,
        ResourceKind::Nginx,
        ResourceKind::Recipes,
        ResourceKind::User,
    ];

    /// Look up a kind by its external resource name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn name(&self) -> &'static str {
        self.def().name
    }

    pub fn def(&self) -> &'static ResourceDef {
        match self {
            Self::Servers => &SERVERS,
            Self::Sites => &SITES,
            Self::Deployments => &DEPLOYMENTS,
            Self::Databases => &DATABASES,
            Self::DatabaseUsers => &DATABASE_USERS,
            Self::Certificates => &CERTIFICATES,
            Self::Daemons => &DAEMONS,
            Self::FirewallRules => &FIREWALL_RULES,
            Self::ScheduledJobs => &SCHEDULED_JOBS,
            Self::SshKeys => &SSH_KEYS,
            Self::Env => &ENV,
            Self::Nginx => &NGINX,
            Self::Recipes => &RECIPES,
            Self::User => &USER,
        }
    }
}

/// Get a resource definition by name
pub fn get_resource(name: &str) -> Option<&'static ResourceDef> {
    ResourceKind::from_name(name).map(|k| k.def())
}

/// Get all resource names
pub fn get_all_resource_names() -> Vec<&'static str> {
    ResourceKind::ALL.iter().map(|k| k.name()).collect()
}

/// Overview of every resource, used when help targets no known resource
pub fn overview_help() -> String {
    let mut out = String::from(
        "Forge gateway. Call with {\"resource\": ..., \"action\": ...} plus the action's fields.\n\nResources:\n",
    );
    for kind in ResourceKind::ALL {
        let def = kind.def();
        out.push_str(&format!("  {} - {} ({})\n", def.name, def.description, def.action_names().join(", ")));
    }
    out.push_str(
        "  batch - Run up to 10 read-only operations concurrently (action: run, operations: [...])\n",
    );
    out.push_str("\nUse {\"resource\": <name>, \"action\": \"help\"} for details on one resource.\n");
    out
}

/// Schema of every resource
pub fn overview_schema() -> Value {
    Value::Array(ResourceKind::ALL.iter().map(|k| k.def().schema()).collect())
}

// =============================================================================
// Descriptors
// =============================================================================

const SERVER_ID: &[&str] = &["server_id"];
const SERVER_AND_ID: &[&str] = &["server_id", "id"];
const SITE: &[&str] = &["server_id", "site_id"];
const SITE_AND_ID: &[&str] = &["server_id", "site_id", "id"];

static SERVERS: ResourceDef = ResourceDef {
    kind: ResourceKind::Servers,
    name: "servers",
    display_name: "Servers",
    description: "Provisioned servers",
    scope: Scope::Root,
    response_keys: ("servers", "server"),
    name_field: Some("name"),
    actions: &[
        read("list", "List all servers", &[]),
        read("get", "Show one server", &["id"]),
        write("create", "Provision a new server", &["provider", "name", "region", "size"]),
        write("update", "Update server settings", &["id"]),
        write("delete", "Delete a server", &["id"]),
        write("reboot", "Reboot a server", &["id"]),
        read("resolve", "Find servers by name", &["query"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "name",
        fields: &[
            ("IP", "ip_address"),
            ("Provider", "provider"),
            ("Region", "region"),
            ("PHP", "php_version"),
            ("Ready", "is_ready"),
        ],
    },
    related: &[
        RelatedDef {
            resource: "sites",
            action: "list",
            args: &[("server_id", HintSource::Item("id"))],
        },
        RelatedDef {
            resource: "databases",
            action: "list",
            args: &[("server_id", HintSource::Item("id"))],
        },
        RelatedDef {
            resource: "daemons",
            action: "list",
            args: &[("server_id", HintSource::Item("id"))],
        },
    ],
};

static SITES: ResourceDef = ResourceDef {
    kind: ResourceKind::Sites,
    name: "sites",
    display_name: "Sites",
    description: "Sites hosted on a server",
    scope: Scope::Server,
    response_keys: ("sites", "site"),
    name_field: Some("name"),
    actions: &[
        read("list", "List sites on a server", SERVER_ID),
        read("get", "Show one site", SERVER_AND_ID),
        write("create", "Create a site", &["server_id", "domain", "project_type"]),
        write("update", "Update a site", SERVER_AND_ID),
        write("delete", "Delete a site", SERVER_AND_ID),
        read("resolve", "Find sites on a server by name", &["query"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "name",
        fields: &[
            ("Directory", "directory"),
            ("Repository", "repository"),
            ("Branch", "repository_branch"),
            ("Status", "status"),
            ("Deployment", "deployment_status"),
        ],
    },
    related: &[
        RelatedDef {
            resource: "deployments",
            action: "list",
            args: &[
                ("server_id", HintSource::Args("server_id")),
                ("site_id", HintSource::Item("id")),
            ],
        },
        RelatedDef {
            resource: "certificates",
            action: "list",
            args: &[
                ("server_id", HintSource::Args("server_id")),
                ("site_id", HintSource::Item("id")),
            ],
        },
        RelatedDef {
            resource: "env",
            action: "get",
            args: &[
                ("server_id", HintSource::Args("server_id")),
                ("site_id", HintSource::Item("id")),
            ],
        },
    ],
};

static DEPLOYMENTS: ResourceDef = ResourceDef {
    kind: ResourceKind::Deployments,
    name: "deployments",
    display_name: "Deployments",
    description: "Site deployments, deploy script and logs",
    scope: Scope::Site,
    response_keys: ("deployments", "deployment"),
    name_field: None,
    actions: &[
        read("list", "Deployment history, newest first", SITE),
        read("get", "Show one deployment", SITE_AND_ID),
        write("deploy", "Trigger a deployment and return immediately", SITE),
        ActionDef {
            name: "deploy_and_wait",
            description: "Trigger a deployment and wait for it to finish (optional timeout_ms, poll_interval_ms)",
            required: SITE,
            read_only: false,
            long_running: true,
        },
        read("log", "Latest deployment log", SITE),
        read("output", "Output of one deployment", SITE_AND_ID),
        read("script", "Show the deploy script", SITE),
        write("update_script", "Replace the deploy script", &["server_id", "site_id", "content"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "commit_message",
        fields: &[
            ("Status", "status"),
            ("Commit", "commit_hash"),
            ("Author", "commit_author"),
            ("Started", "started_at"),
            ("Ended", "ended_at"),
        ],
    },
    related: &[RelatedDef {
        resource: "deployments",
        action: "output",
        args: &[
            ("server_id", HintSource::Args("server_id")),
            ("site_id", HintSource::Args("site_id")),
            ("id", HintSource::Item("id")),
        ],
    }],
};

static DATABASES: ResourceDef = ResourceDef {
    kind: ResourceKind::Databases,
    name: "databases",
    display_name: "Databases",
    description: "Databases on a server",
    scope: Scope::Server,
    response_keys: ("databases", "database"),
    name_field: Some("name"),
    actions: &[
        read("list", "List databases", SERVER_ID),
        read("get", "Show one database", SERVER_AND_ID),
        write("create", "Create a database (optional user, password)", &["server_id", "name"]),
        write("delete", "Delete a database", SERVER_AND_ID),
        read("resolve", "Find databases on a server by name", &["query"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("Status", "status"), ("Created", "created_at")],
    },
    related: &[RelatedDef {
        resource: "database_users",
        action: "list",
        args: &[("server_id", HintSource::Args("server_id"))],
    }],
};

static DATABASE_USERS: ResourceDef = ResourceDef {
    kind: ResourceKind::DatabaseUsers,
    name: "database_users",
    display_name: "Database Users",
    description: "Database users on a server",
    scope: Scope::Server,
    response_keys: ("users", "user"),
    name_field: None,
    actions: &[
        read("list", "List database users", SERVER_ID),
        read("get", "Show one database user", SERVER_AND_ID),
        write(
            "create",
            "Create a database user (databases: comma-separated ids)",
            &["server_id", "name", "password"],
        ),
        write("delete", "Delete a database user", SERVER_AND_ID),
    ],
    mappings: &[("create", ArgMapping::SplitList("databases"))],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("Status", "status"), ("Databases", "databases")],
    },
    related: &[],
};

static CERTIFICATES: ResourceDef = ResourceDef {
    kind: ResourceKind::Certificates,
    name: "certificates",
    display_name: "Certificates",
    description: "SSL certificates of a site",
    scope: Scope::Site,
    response_keys: ("certificates", "certificate"),
    name_field: None,
    actions: &[
        read("list", "List certificates", SITE),
        read("get", "Show one certificate", SITE_AND_ID),
        write(
            "letsencrypt",
            "Obtain a Let's Encrypt certificate (domains: comma-separated)",
            &["server_id", "site_id", "domains"],
        ),
        write("activate", "Activate a certificate", SITE_AND_ID),
        write("delete", "Delete a certificate", SITE_AND_ID),
    ],
    mappings: &[("letsencrypt", ArgMapping::SplitList("domains"))],
    compact: CompactFormat {
        title_field: "domain",
        fields: &[
            ("Type", "type"),
            ("Status", "status"),
            ("Active", "active"),
            ("Expires", "expires_at"),
        ],
    },
    related: &[],
};

static DAEMONS: ResourceDef = ResourceDef {
    kind: ResourceKind::Daemons,
    name: "daemons",
    display_name: "Daemons",
    description: "Supervised background processes on a server",
    scope: Scope::Server,
    response_keys: ("daemons", "daemon"),
    name_field: None,
    actions: &[
        read("list", "List daemons", SERVER_ID),
        read("get", "Show one daemon", SERVER_AND_ID),
        write("create", "Create a daemon", &["server_id", "command", "user"]),
        write("restart", "Restart a daemon", SERVER_AND_ID),
        write("delete", "Delete a daemon", SERVER_AND_ID),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "command",
        fields: &[("User", "user"), ("Directory", "directory"), ("Status", "status")],
    },
    related: &[],
};

static FIREWALL_RULES: ResourceDef = ResourceDef {
    kind: ResourceKind::FirewallRules,
    name: "firewall_rules",
    display_name: "Firewall Rules",
    description: "Firewall rules of a server",
    scope: Scope::Server,
    response_keys: ("rules", "rule"),
    name_field: None,
    actions: &[
        read("list", "List firewall rules", SERVER_ID),
        read("get", "Show one firewall rule", SERVER_AND_ID),
        write("create", "Open a port (optional ip_address)", &["server_id", "name", "port"]),
        write("delete", "Delete a firewall rule", SERVER_AND_ID),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("Port", "port"), ("IP", "ip_address"), ("Status", "status")],
    },
    related: &[],
};

static SCHEDULED_JOBS: ResourceDef = ResourceDef {
    kind: ResourceKind::ScheduledJobs,
    name: "scheduled_jobs",
    display_name: "Scheduled Jobs",
    description: "Cron jobs on a server",
    scope: Scope::Server,
    response_keys: ("jobs", "job"),
    name_field: None,
    actions: &[
        read("list", "List scheduled jobs", SERVER_ID),
        read("get", "Show one scheduled job", SERVER_AND_ID),
        write(
            "create",
            "Create a scheduled job (frequency: minutely, hourly, nightly, weekly, monthly, custom)",
            &["server_id", "command", "frequency"],
        ),
        write("delete", "Delete a scheduled job", SERVER_AND_ID),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "command",
        fields: &[("User", "user"), ("Frequency", "frequency"), ("Cron", "cron"), ("Status", "status")],
    },
    related: &[],
};

static SSH_KEYS: ResourceDef = ResourceDef {
    kind: ResourceKind::SshKeys,
    name: "ssh_keys",
    display_name: "SSH Keys",
    description: "Authorized SSH keys on a server",
    scope: Scope::Server,
    response_keys: ("keys", "key"),
    name_field: None,
    actions: &[
        read("list", "List SSH keys", SERVER_ID),
        read("get", "Show one SSH key", SERVER_AND_ID),
        write("create", "Install an SSH key", &["server_id", "name", "public_key"]),
        write("delete", "Remove an SSH key", SERVER_AND_ID),
    ],
    mappings: &[(
        "create",
        ArgMapping::Rename {
            from: "public_key",
            to: "key",
        },
    )],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("Status", "status"), ("Created", "created_at")],
    },
    related: &[],
};

static ENV: ResourceDef = ResourceDef {
    kind: ResourceKind::Env,
    name: "env",
    display_name: "Environment",
    description: "Environment file of a site",
    scope: Scope::Site,
    response_keys: ("", ""),
    name_field: None,
    actions: &[
        read("get", "Show the .env file", SITE),
        write("update", "Replace the .env file", &["server_id", "site_id", "content"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "",
        fields: &[],
    },
    related: &[],
};

static NGINX: ResourceDef = ResourceDef {
    kind: ResourceKind::Nginx,
    name: "nginx",
    display_name: "Nginx Configuration",
    description: "Nginx configuration of a site",
    scope: Scope::Site,
    response_keys: ("", ""),
    name_field: None,
    actions: &[
        read("get", "Show the nginx configuration", SITE),
        write("update", "Replace the nginx configuration", &["server_id", "site_id", "content"]),
    ],
    mappings: &[],
    compact: CompactFormat {
        title_field: "",
        fields: &[],
    },
    related: &[],
};

static RECIPES: ResourceDef = ResourceDef {
    kind: ResourceKind::Recipes,
    name: "recipes",
    display_name: "Recipes",
    description: "Reusable scripts that run across servers",
    scope: Scope::Root,
    response_keys: ("recipes", "recipe"),
    name_field: Some("name"),
    actions: &[
        read("list", "List recipes", &[]),
        read("get", "Show one recipe", &["id"]),
        write("create", "Create a recipe", &["name", "user", "script"]),
        write("delete", "Delete a recipe", &["id"]),
        write("run", "Run a recipe (servers: comma-separated server ids)", &["id", "servers"]),
        read("resolve", "Find recipes by name", &["query"]),
    ],
    mappings: &[("run", ArgMapping::SplitList("servers"))],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("User", "user"), ("Created", "created_at")],
    },
    related: &[],
};

static USER: ResourceDef = ResourceDef {
    kind: ResourceKind::User,
    name: "user",
    display_name: "User",
    description: "The authenticated Forge account",
    scope: Scope::Root,
    response_keys: ("", "user"),
    name_field: None,
    actions: &[read("get", "Show the authenticated user", &[])],
    mappings: &[],
    compact: CompactFormat {
        title_field: "name",
        fields: &[("Email", "email"), ("Connected", "connected_to_digitalocean")],
    },
    related: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_round_trips_by_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_name(kind.name()), Some(*kind));
            assert_eq!(kind.def().kind, *kind);
        }
    }

    #[test]
    fn test_servers_resource_exists() {
        let resource = get_resource("servers").expect("servers resource should exist");
        assert_eq!(resource.display_name, "Servers");
        assert!(resource.is_resolvable());
        assert_eq!(resource.action("get").unwrap().required, &["id"]);
    }

    #[test]
    fn test_action_names_are_unique_per_resource() {
        for kind in ResourceKind::ALL {
            let mut names = kind.def().action_names();
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), before, "duplicate action in {}", kind.name());
        }
    }

    #[test]
    fn test_help_and_schema_are_reserved() {
        for kind in ResourceKind::ALL {
            assert!(kind.def().action("help").is_none());
            assert!(kind.def().action("schema").is_none());
        }
    }

    #[test]
    fn test_only_deploy_and_wait_is_long_running() {
        let long: Vec<_> = ResourceKind::ALL
            .iter()
            .flat_map(|k| k.def().actions.iter().filter(|a| a.long_running).map(move |a| (k.name(), a.name)))
            .collect();
        assert_eq!(long, vec![("deployments", "deploy_and_wait")]);
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = get_resource("sites").unwrap().schema();
        let create = schema["actions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["name"] == "create")
            .unwrap();
        assert_eq!(create["required"], json!(["server_id", "domain", "project_type"]));
        assert_eq!(create["read_only"], json!(false));
    }

    #[test]
    fn test_get_all_resource_names() {
        let names = get_all_resource_names();
        assert!(names.contains(&"servers"));
        assert!(names.contains(&"deployments"));
        assert!(!names.contains(&"batch"));
    }
}
