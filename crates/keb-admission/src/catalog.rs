//! Plan and JSON-schema catalog.
//!
//! Every enabled plan gets a create and an update schema. The shape depends
//! on the plan, on the create/update variant and on the schema feature flags.
//! Schemas are plain `serde_json` values with sorted maps, so identical
//! inputs always render to identical bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use keb_core::{
    BrokerConfig, CloudProvider, KYMA_SERVICE_ID, KYMA_SERVICE_NAME, OidcConfig, Plan, PlanRegistry,
    PlanSpecifications, ProviderSpec,
};
use serde::Serialize;
use serde_json::{Map, Value, json};

const DRAFT_04: &str = "http://json-schema.org/draft-04/schema#";

const SERVICE_DESCRIPTION: &str = "SAP BTP, Kyma runtime";
const SERVICE_DISPLAY_NAME: &str = "Kyma Environment";

/// Form order of the top-level controls. Schemas list only the controls
/// they actually carry, in this order.
pub const DEFAULT_CONTROLS_ORDER: [&str; 16] = [
    "name",
    "kubeconfig",
    "shootName",
    "shootDomain",
    "region",
    "shootAndSeedSameRegion",
    "machineType",
    "autoScalerMin",
    "autoScalerMax",
    "zonesCount",
    "additionalWorkerNodePools",
    "modules",
    "networking",
    "oidc",
    "administrators",
    "ingressFiltering",
];

const OIDC_CONTROLS_ORDER: [&str; 8] = [
    "clientID",
    "groupsClaim",
    "issuerURL",
    "signingAlgs",
    "usernameClaim",
    "usernamePrefix",
    "groupsPrefix",
    "requiredClaims",
];

const NON_HA_AUTOSCALER_MIN_MINIMUM: i32 = 0;
const NON_HA_AUTOSCALER_MAX_MINIMUM: i32 = 1;
const AUTOSCALER_MAX_DEFAULT: i32 = 20;

const POOL_NAME_PATTERN: &str = "^(?!cpu-worker-0$)[a-z0-9]([-a-z0-9]*[a-z0-9])?$";
const CLUSTER_NAME_PATTERN: &str = "^[a-zA-Z0-9-]*$";
const SHOOT_DOMAIN_PATTERN: &str = "^[a-zA-Z0-9-\\.]*$";

/// Only offered to azure_lite when smaller machine types are enabled.
const SMALL_AZURE_LITE_MACHINE: &str = "Standard_D2s_v5";

// ── Catalog types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub instances_retrievable: bool,
    pub allow_context_updates: bool,
    pub tags: Vec<String>,
    pub metadata: ServiceMetadata,
    pub plans: Vec<ServicePlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetadata {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metadata: PlanMetadata,
    pub schemas: ServiceSchemas,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanMetadata {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSchemas {
    pub service_instance: InstanceSchemas,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSchemas {
    pub create: SchemaParameters,
    pub update: SchemaParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaParameters {
    pub parameters: Value,
}

// ── Flags ──────────────────────────────────────────────────────────

/// Feature switches that shape a plan's schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaFlags {
    pub include_additional_parameters: bool,
    pub use_additional_oidc_schema: bool,
    pub shoot_and_seed_enabled: bool,
    pub ingress_filtering_enabled: bool,
    pub disabled_machine_type_update: bool,
    pub reject_unsupported_parameters: bool,
}

/// Autoscaler limits that differ between regular plans and azure_lite.
#[derive(Debug, Clone, Copy)]
struct Sizing {
    min_minimum: i32,
    max_maximum: i32,
    create_defaults: (i32, i32),
    pool_defaults: (i32, i32),
    pool_max_maximum: i32,
    pool_ha_zones: bool,
}

impl Sizing {
    const STANDARD: Sizing = Sizing {
        min_minimum: keb_core::HA_AUTOSCALER_MINIMUM,
        max_maximum: keb_core::AUTOSCALER_MAXIMUM,
        create_defaults: (keb_core::HA_AUTOSCALER_MINIMUM, AUTOSCALER_MAX_DEFAULT),
        pool_defaults: (keb_core::HA_AUTOSCALER_MINIMUM, AUTOSCALER_MAX_DEFAULT),
        pool_max_maximum: keb_core::AUTOSCALER_MAXIMUM,
        pool_ha_zones: true,
    };

    const LITE: Sizing = Sizing {
        min_minimum: 2,
        max_maximum: 40,
        create_defaults: (2, 10),
        pool_defaults: (2, 10),
        pool_max_maximum: 40,
        pool_ha_zones: false,
    };
}

// ── Properties ─────────────────────────────────────────────────────

/// Schema properties of a plan. Only the update subset survives in the
/// update variant.
#[derive(Debug, Default)]
struct Properties {
    kubeconfig: Option<Value>,
    auto_scaler_min: Option<Value>,
    auto_scaler_max: Option<Value>,
    oidc: Option<Value>,
    administrators: Option<Value>,
    machine_type: Option<Value>,
    additional_worker_node_pools: Option<Value>,
    ingress_filtering: Option<Value>,

    name: Option<Value>,
    shoot_name: Option<Value>,
    shoot_domain: Option<Value>,
    region: Option<Value>,
    networking: Option<Value>,
    modules: Option<Value>,
    shoot_and_seed_same_region: Option<Value>,
}

impl Properties {
    fn into_map(self, update: bool) -> Map<String, Value> {
        let mut entries = vec![
            ("kubeconfig", self.kubeconfig),
            ("autoScalerMin", self.auto_scaler_min),
            ("autoScalerMax", self.auto_scaler_max),
            ("oidc", self.oidc),
            ("administrators", self.administrators),
            ("machineType", self.machine_type),
            ("additionalWorkerNodePools", self.additional_worker_node_pools),
            ("ingressFiltering", self.ingress_filtering),
        ];
        if !update {
            entries.extend([
                ("name", self.name),
                ("shootName", self.shoot_name),
                ("shootDomain", self.shoot_domain),
                ("region", self.region),
                ("networking", self.networking),
                ("modules", self.modules),
                ("shootAndSeedSameRegion", self.shoot_and_seed_same_region),
            ]);
        }
        entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect()
    }
}

fn enum_of(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn string_enum(values: &[String], display: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("type".into(), json!("string"));
    if !values.is_empty() {
        m.insert("enum".into(), enum_of(values));
    }
    if !display.is_empty() {
        m.insert("_enumDisplayName".into(), json!(display));
    }
    m
}

fn reject_extra(mut value: Value, reject: bool) -> Value {
    if reject && let Value::Object(m) = &mut value {
        m.insert("additionalProperties".into(), Value::Bool(false));
    }
    value
}

fn autoscaler(description: &str, minimum: i32, maximum: i32, default: Option<i32>) -> Value {
    let mut v = json!({
        "type": "integer",
        "description": description,
        "minimum": minimum,
        "maximum": maximum,
    });
    if let (Some(d), Value::Object(m)) = (default, &mut v) {
        m.insert("default".into(), json!(d));
    }
    v
}

fn name_property() -> Value {
    json!({
        "type": "string",
        "title": "Cluster Name",
        "pattern": CLUSTER_NAME_PATTERN,
        "minLength": 1,
        "_BTPdefaultTemplate": { "elements": ["saSubdomain"] },
    })
}

fn kubeconfig_property() -> Value {
    json!({ "type": "string", "title": "Kubeconfig contents" })
}

fn shoot_name_property() -> Value {
    json!({
        "type": "string",
        "title": "Shoot name",
        "pattern": CLUSTER_NAME_PATTERN,
        "minLength": 1,
    })
}

fn shoot_domain_property() -> Value {
    json!({
        "type": "string",
        "title": "Shoot domain",
        "pattern": SHOOT_DOMAIN_PATTERN,
        "minLength": 1,
    })
}

fn shoot_and_seed_same_region_property() -> Value {
    json!({
        "type": "boolean",
        "title": "Enforce same location for Seed and Shoot",
        "default": false,
        "description": "If set to true, a Gardener seed is placed in the same region as the selected region from the Region field. The provisioning process fails if no seed is available in the region.",
    })
}

fn ingress_filtering_property() -> Value {
    json!({
        "type": "boolean",
        "title": "Enable ingress geo-blocking",
        "default": false,
        "description": "If set to true, ingress traffic from embargoed countries is blocked.",
    })
}

fn administrators_property() -> Value {
    json!({
        "type": "array",
        "title": "Administrators",
        "description": "Specifies the list of runtime administrators",
        "items": { "type": "string" },
    })
}

fn networking_property(config: &keb_core::config::NetworkingConfig, reject: bool) -> Value {
    let seeds = config.reserved_cidrs.join(", ");
    let cidr = |title: &str, what: &str, default: &str| {
        json!({
            "type": "string",
            "title": title,
            "description": format!("CIDR range for {what}, must not overlap with the following CIDRs: {seeds}"),
            "default": default,
        })
    };
    reject_extra(
        json!({
            "type": "object",
            "description": "Networking configuration. These values are immutable and cannot be updated later. All provided CIDR ranges must not overlap one another.",
            "properties": {
                "nodes": cidr("CIDR range for Nodes", "Nodes", &config.default_nodes_cidr),
                "pods": cidr("CIDR range for Pods", "Pods", &config.default_pods_cidr),
                "services": cidr("CIDR range for Services", "Services", &config.default_services_cidr),
            },
            "required": ["nodes"],
        }),
        reject,
    )
}

fn modules_property(reject: bool) -> Value {
    let modules_link = "<a href=https://help.sap.com/docs/btp/sap-business-technology-platform/kyma-modules?version=Cloud>";
    let mut custom_list = json!({
        "type": "array",
        "uniqueItems": true,
        "description": format!("Check a module technical name on this {modules_link}website</a>. You can only use a module technical name once. Provide an empty custom list of modules if you don’t want any modules enabled."),
        "items": {
            "type": "object",
            "_controlsOrder": ["name", "channel", "customResourcePolicy"],
            "properties": {
                "name": {
                    "type": "string",
                    "title": "Name",
                    "minLength": 1,
                    "description": format!("Check a module technical name on this {modules_link}website</a>. You can only use a module technical name once."),
                },
                "channel": {
                    "type": "string",
                    "default": "",
                    "description": "Select your preferred release channel or leave this field empty.",
                    "enum": ["", "regular", "fast"],
                    "_enumDisplayName": {
                        "": "",
                        "regular": "Regular - default version",
                        "fast": "Fast - latest version",
                    },
                },
                "customResourcePolicy": {
                    "type": "string",
                    "default": "",
                    "description": "Select your preferred CustomResourcePolicy setting or leave this field empty.",
                    "enum": ["", "CreateAndDelete", "Ignore"],
                    "_enumDisplayName": {
                        "": "",
                        "CreateAndDelete": "CreateAndDelete - default module resource is created or deleted.",
                        "Ignore": "Ignore - module resource is not created.",
                    },
                },
            },
        },
    });
    custom_list = reject_extra(custom_list, reject);

    json!({
        "type": "object",
        "description": "Use default modules or provide your custom list of modules. Provide an empty custom list of modules if you don’t want any modules enabled.",
        "_controlsOrder": ["default", "list"],
        "oneOf": [
            {
                "type": "object",
                "title": "Default",
                "description": "Default modules",
                "additionalProperties": false,
                "properties": {
                    "default": {
                        "type": "boolean",
                        "title": "Use Default",
                        "description": format!("Check the default modules in the {modules_link}default modules table</a>."),
                        "default": true,
                        "readOnly": true,
                    },
                },
            },
            {
                "type": "object",
                "title": "Custom",
                "description": "Define custom module list",
                "additionalProperties": false,
                "properties": { "list": custom_list },
            },
        ],
    })
}

const DESC_CLIENT_ID: &str = "The client ID for the OpenID Connect client.";
const DESC_ISSUER_URL: &str = "The URL of the OpenID issuer, only HTTPS scheme will be accepted.";
const DESC_GROUPS_CLAIM: &str = "If provided, the name of a custom OpenID Connect claim for specifying user groups.";
const DESC_USERNAME_CLAIM: &str = "The OpenID claim to use as the user name.";
const DESC_USERNAME_PREFIX: &str = "If provided, all usernames will be prefixed with this value. If not provided, username claims other than 'email' are prefixed by the issuer URL to avoid clashes. To skip any prefixing, provide the value '-' (dash character without additional characters).";
const DESC_SIGNING_ALGS: &str = "Comma separated list of allowed JOSE asymmetric signing algorithms, for example, RS256, ES256";
const DESC_GROUPS_PREFIX: &str = "if specified, causes claims mapping to group names to be prefixed with the value. A value 'oidc:' would result in groups like 'oidc:engineering' and 'oidc:marketing'. If not provided, the prefix defaults to '( .metadata.name )/'.The value '-' can be used to disable all prefixing.";
const DESC_REQUIRED_CLAIMS: &str = "List of key=value pairs that describes a required claim in the ID Token. If set, the claim is verified to be present in the ID Token with a matching value.";

/// Legacy single-object OIDC schema.
fn oidc_single_property(reject: bool) -> Value {
    reject_extra(
        json!({
            "type": "object",
            "description": "OIDC configuration",
            "properties": {
                "clientID": { "type": "string", "description": DESC_CLIENT_ID },
                "issuerURL": { "type": "string", "description": DESC_ISSUER_URL },
                "groupsClaim": { "type": "string", "description": DESC_GROUPS_CLAIM },
                "usernameClaim": { "type": "string", "description": DESC_USERNAME_CLAIM },
                "usernamePrefix": { "type": "string", "description": DESC_USERNAME_PREFIX },
                "signingAlgs": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": DESC_SIGNING_ALGS,
                },
            },
            "required": ["clientID", "issuerURL"],
        }),
        reject,
    )
}

/// List-or-object OIDC schema. The object form is read-only on create.
fn oidc_list_property(default: &OidcConfig, update: bool, reject: bool) -> Value {
    let read_only = !update;
    let legacy_field = |description: &str| {
        let mut v = json!({ "type": "string", "description": description });
        if read_only && let Value::Object(m) = &mut v {
            m.insert("readOnly".into(), Value::Bool(true));
        }
        v
    };
    let mut legacy = json!({
        "type": "object",
        "title": "Object (not recommended)",
        "description": "Legacy OIDC configuration",
        "_controlsOrder": OIDC_CONTROLS_ORDER,
        "properties": {
            "clientID": legacy_field(DESC_CLIENT_ID),
            "issuerURL": legacy_field(DESC_ISSUER_URL),
            "groupsClaim": legacy_field(DESC_GROUPS_CLAIM),
            "usernameClaim": legacy_field(DESC_USERNAME_CLAIM),
            "usernamePrefix": legacy_field(DESC_USERNAME_PREFIX),
            "groupsPrefix": legacy_field(DESC_GROUPS_PREFIX),
            "signingAlgs": {
                "type": "array",
                "items": { "type": "string" },
                "description": DESC_SIGNING_ALGS,
            },
            "requiredClaims": {
                "type": "array",
                "items": { "type": "string", "pattern": "^[^=]+=[^=]+$" },
                "description": DESC_REQUIRED_CLAIMS,
            },
        },
        "required": ["clientID", "issuerURL"],
    });
    if read_only {
        for key in ["signingAlgs", "requiredClaims"] {
            if let Some(Value::Object(m)) = legacy.pointer_mut(&format!("/properties/{key}")) {
                m.insert("readOnly".into(), Value::Bool(true));
            }
        }
    }
    legacy = reject_extra(legacy, reject);

    let with_default = |description: &str, default: &str| {
        json!({ "type": "string", "minLength": 1, "default": default, "description": description })
    };
    json!({
        "type": "object",
        "description": "OIDC configuration. The list-based configuration is recommended. The object-based configuration is provided for backward compatibility. The object-based configuration inputs are still writable, but only from the JSON view.",
        "oneOf": [
            {
                "type": "object",
                "title": "List",
                "description": "OIDC configuration list",
                "additionalProperties": false,
                "properties": {
                    "list": {
                        "type": "array",
                        "uniqueItems": true,
                        "description": "Specifies the list of OIDC configurations. Besides the default OIDC configuration, you can add multiple custom OIDC configurations. Leave the list empty to not use any OIDC configuration.",
                        "default": [{
                            "clientID": default.client_id,
                            "issuerURL": default.issuer_url,
                            "groupsClaim": default.groups_claim,
                            "signingAlgs": default.signing_algs,
                            "usernameClaim": default.username_claim,
                            "usernamePrefix": default.username_prefix,
                            "groupsPrefix": default.groups_prefix,
                            "requiredClaims": [],
                        }],
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "_controlsOrder": OIDC_CONTROLS_ORDER,
                            "properties": {
                                "clientID": { "type": "string", "minLength": 1, "description": DESC_CLIENT_ID },
                                "issuerURL": { "type": "string", "minLength": 1, "description": DESC_ISSUER_URL },
                                "groupsClaim": with_default(DESC_GROUPS_CLAIM, &default.groups_claim),
                                "usernameClaim": with_default(DESC_USERNAME_CLAIM, &default.username_claim),
                                "usernamePrefix": with_default(DESC_USERNAME_PREFIX, &default.username_prefix),
                                "groupsPrefix": with_default(DESC_GROUPS_PREFIX, &default.groups_prefix),
                                "signingAlgs": {
                                    "type": "array",
                                    "minItems": 1,
                                    "items": { "type": "string" },
                                    "default": default.signing_algs,
                                    "description": DESC_SIGNING_ALGS,
                                },
                                "requiredClaims": {
                                    "type": "array",
                                    "items": { "type": "string", "pattern": "^[^=]+=[^=]+$" },
                                    "description": DESC_REQUIRED_CLAIMS,
                                },
                            },
                            "required": ["clientID", "issuerURL", "groupsClaim", "usernameClaim", "usernamePrefix", "signingAlgs", "groupsPrefix"],
                        },
                    },
                },
            },
            legacy,
        ],
    })
}

fn additional_pools_property(
    machines: &[String],
    display: &BTreeMap<String, String>,
    sizing: Sizing,
    reject: bool,
) -> Value {
    let mut machine_type = string_enum(machines, display);
    machine_type.insert("minLength".into(), json!(1));
    machine_type.insert(
        "description".into(),
        json!("Specifies the type of the virtual machine. The machine type marked with “*” has limited availability and generates high cost. This setting is permanent, and you cannot change it later. To use a different machine type, you must create a new worker node pool, migrate workloads to it, and decommission the old one."),
    );

    let mut properties = Map::new();
    properties.insert(
        "name".into(),
        json!({
            "type": "string",
            "minLength": 1,
            "maxLength": keb_core::WORKER_POOL_NAME_MAX_LEN,
            "pattern": POOL_NAME_PATTERN,
            "description": "Specifies the unique name of the additional worker node pool. The name must consist of lowercase alphanumeric characters or '-', must start and end with an alphanumeric character, and can be a maximum of 15 characters in length. Do not use the name “cpu-worker-0” because it's reserved for the Kyma worker node pool.",
        }),
    );
    properties.insert("machineType".into(), Value::Object(machine_type));
    if sizing.pool_ha_zones {
        properties.insert(
            "haZones".into(),
            json!({
                "type": "boolean",
                "title": "HA zones",
                "default": true,
                "description": "Specifies whether high availability (HA) zones are supported. This setting is permanent and cannot be changed later. If HA is disabled, all resources are placed in a single, randomly selected zone. Disabled HA allows setting autoScalerMin to 0 and autoScalerMax to 1, which helps reduce costs. It is not recommended for production environments. When enabled, resources are distributed across three zones to enhance fault tolerance. Enabled HA requires setting autoScalerMin to the minimal value 3.",
            }),
        );
    }
    properties.insert(
        "autoScalerMin".into(),
        autoscaler(
            "Specifies the minimum number of virtual machines to create.",
            NON_HA_AUTOSCALER_MIN_MINIMUM,
            keb_core::AUTOSCALER_MAXIMUM,
            Some(sizing.pool_defaults.0),
        ),
    );
    properties.insert(
        "autoScalerMax".into(),
        autoscaler(
            "Specifies the maximum number of virtual machines to create.",
            NON_HA_AUTOSCALER_MAX_MINIMUM,
            sizing.pool_max_maximum,
            Some(sizing.pool_defaults.1),
        ),
    );

    let order: Vec<&str> = ["name", "machineType", "haZones", "autoScalerMin", "autoScalerMax"]
        .into_iter()
        .filter(|k| sizing.pool_ha_zones || *k != "haZones")
        .collect();
    let items = reject_extra(
        json!({
            "type": "object",
            "_controlsOrder": order,
            "required": order,
            "properties": properties,
        }),
        reject,
    );
    json!({
        "type": "array",
        "uniqueItems": true,
        "description": "Specifies the list of additional worker node pools.",
        "items": items,
    })
}

fn root_schema(properties: Map<String, Value>, required: &[&str], reject: bool) -> Value {
    let order: Vec<&str> = DEFAULT_CONTROLS_ORDER
        .into_iter()
        .filter(|c| properties.contains_key(*c))
        .collect();
    let mut root = Map::new();
    root.insert("$schema".into(), json!(DRAFT_04));
    root.insert("type".into(), json!("object"));
    root.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        root.insert("required".into(), json!(required));
    }
    root.insert("_show_form_view".into(), Value::Bool(true));
    root.insert("_controlsOrder".into(), json!(order));
    root.insert("_load_current_config".into(), Value::Bool(true));
    if reject {
        root.insert("additionalProperties".into(), Value::Bool(false));
    }
    Value::Object(root)
}

fn empty_schema() -> Value {
    Value::Object(Map::new())
}

// ── Schema service ─────────────────────────────────────────────────

const REQUIRED_DEFAULT: [&str; 2] = ["name", "region"];
const REQUIRED_TRIAL: [&str; 1] = ["name"];
const REQUIRED_OWN_CLUSTER: [&str; 4] = ["name", "kubeconfig", "shootName", "shootDomain"];

/// Builds plan schemas from the broker, provider and plan configuration.
#[derive(Debug, Clone)]
pub struct SchemaService {
    config: Arc<BrokerConfig>,
    providers: Arc<ProviderSpec>,
    plans: Arc<PlanSpecifications>,
}

impl SchemaService {
    pub fn new(config: Arc<BrokerConfig>, providers: Arc<ProviderSpec>, plans: Arc<PlanSpecifications>) -> Self {
        Self {
            config,
            providers,
            plans,
        }
    }

    pub fn flags(&self, plan: Plan) -> SchemaFlags {
        let broker = &self.config.broker;
        SchemaFlags {
            include_additional_parameters: broker.include_additional_params_in_schema,
            use_additional_oidc_schema: broker.use_additional_oidc_schema,
            shoot_and_seed_enabled: broker.enable_shoot_and_seed_same_region,
            ingress_filtering_enabled: self.config.infrastructure_manager.ingress_filtering_for(plan),
            disabled_machine_type_update: broker.disable_machine_type_update,
            reject_unsupported_parameters: broker.reject_unsupported_parameters,
        }
    }

    /// Create or update schema of a plan.
    ///
    /// `platform_provider` only matters for the free plan, which offers the
    /// regions of the marketplace's own provider.
    pub fn schema(&self, plan: Plan, platform_region: &str, platform_provider: CloudProvider, update: bool) -> Value {
        let mut flags = self.flags(plan);
        match plan {
            Plan::OwnCluster => self.own_cluster_schema(update, flags),
            Plan::Trial => {
                if update && !flags.include_additional_parameters {
                    return empty_schema();
                }
                flags.shoot_and_seed_enabled = false;
                let properties = Properties {
                    name: Some(name_property()),
                    modules: (!update).then(|| modules_property(flags.reject_unsupported_parameters)),
                    ..Default::default()
                };
                self.finish(properties, &REQUIRED_TRIAL, update, flags)
            }
            Plan::Free => {
                flags.shoot_and_seed_enabled = false;
                let (region_plan, provider) = match platform_provider {
                    CloudProvider::Azure => (Plan::Azure, CloudProvider::Azure),
                    _ => (Plan::Aws, CloudProvider::Aws),
                };
                let regions = self.plans.regions(region_plan.name(), platform_region);
                let display = self.providers.region_display_names(provider, &regions);
                let mut region = string_enum(&regions, &display);
                region.insert("minLength".into(), json!(1));
                let reject = flags.reject_unsupported_parameters;
                let properties = Properties {
                    name: Some(name_property()),
                    region: Some(Value::Object(region)),
                    networking: (!update).then(|| networking_property(&self.config.networking, reject)),
                    modules: (!update).then(|| modules_property(reject)),
                    ..Default::default()
                };
                self.finish(properties, &REQUIRED_DEFAULT, update, flags)
            }
            _ => {
                let sizing = if plan == Plan::AzureLite { Sizing::LITE } else { Sizing::STANDARD };
                let properties = self.provisioning_properties(plan, platform_region, update, sizing, flags);
                self.finish(properties, &REQUIRED_DEFAULT, update, flags)
            }
        }
    }

    fn machines(&self, plan: Plan) -> (Vec<String>, Vec<String>) {
        let mut regular = self.plans.regular_machines(plan.name());
        if plan == Plan::AzureLite && !self.config.infrastructure_manager.use_smaller_machine_types {
            regular.retain(|m| m != SMALL_AZURE_LITE_MACHINE);
        }
        let mut additional = self.plans.additional_machines(plan.name());
        if additional.is_empty() {
            additional = regular.clone();
        }
        (regular, additional)
    }

    fn provisioning_properties(
        &self,
        plan: Plan,
        platform_region: &str,
        update: bool,
        sizing: Sizing,
        flags: SchemaFlags,
    ) -> Properties {
        let provider = plan.fixed_provider().unwrap_or(CloudProvider::Unknown);
        let regions = self.plans.regions(plan.name(), platform_region);
        let region_display = self.providers.region_display_names(provider, &regions);
        let (machines, additional) = self.machines(plan);
        let machine_display = self.providers.machine_display_names(provider, &machines);
        let additional_display = self.providers.machine_display_names(provider, &additional);
        let reject = flags.reject_unsupported_parameters;

        let mut machine_type = string_enum(&machines, &machine_display);
        machine_type.insert("description".into(), json!("Specifies the type of the virtual machine."));
        if update && flags.disabled_machine_type_update {
            machine_type.insert("readOnly".into(), Value::Bool(true));
        }
        let mut region = string_enum(&regions, &region_display);
        region.insert("minLength".into(), json!(1));

        let (min_default, max_default) = if update {
            (None, None)
        } else {
            (Some(sizing.create_defaults.0), Some(sizing.create_defaults.1))
        };

        Properties {
            auto_scaler_min: Some(autoscaler(
                "Specifies the minimum number of virtual machines to create",
                sizing.min_minimum,
                keb_core::AUTOSCALER_MAXIMUM,
                min_default,
            )),
            auto_scaler_max: Some(autoscaler(
                "Specifies the maximum number of virtual machines to create",
                sizing.min_minimum,
                sizing.max_maximum,
                max_default,
            )),
            machine_type: Some(Value::Object(machine_type)),
            additional_worker_node_pools: Some(additional_pools_property(&additional, &additional_display, sizing, reject)),
            name: Some(name_property()),
            region: Some(Value::Object(region)),
            networking: Some(networking_property(&self.config.networking, reject)),
            modules: Some(modules_property(reject)),
            ..Default::default()
        }
    }

    fn own_cluster_schema(&self, update: bool, flags: SchemaFlags) -> Value {
        let reject = flags.reject_unsupported_parameters;
        let properties = Properties {
            kubeconfig: Some(kubeconfig_property()),
            name: Some(name_property()),
            shoot_name: Some(shoot_name_property()),
            shoot_domain: Some(shoot_domain_property()),
            modules: (!update).then(|| modules_property(reject)),
            ..Default::default()
        };
        let required: &[&str] = if update { &[] } else { &REQUIRED_OWN_CLUSTER };
        root_schema(properties.into_map(update), required, reject)
    }

    /// Add the flag-dependent properties and render the root schema.
    fn finish(&self, mut properties: Properties, required: &[&str], update: bool, flags: SchemaFlags) -> Value {
        let reject = flags.reject_unsupported_parameters;
        if flags.include_additional_parameters {
            properties.oidc = Some(if flags.use_additional_oidc_schema {
                oidc_list_property(&self.config.default_oidc, update, reject)
            } else {
                oidc_single_property(reject)
            });
            properties.administrators = Some(administrators_property());
        }
        if flags.ingress_filtering_enabled {
            properties.ingress_filtering = Some(ingress_filtering_property());
        }
        if flags.shoot_and_seed_enabled && flags.include_additional_parameters && !update {
            properties.shoot_and_seed_same_region = Some(shoot_and_seed_same_region_property());
        }
        root_schema(properties.into_map(update), required, reject)
    }

    fn service_plan(&self, plan: Plan, platform_region: &str, platform_provider: CloudProvider) -> ServicePlan {
        let configured = self.config.plans.get(plan.name());
        let fallback = plan.name().to_uppercase();
        let description = configured
            .map(|c| c.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| fallback.clone());
        let display_name = configured
            .map(|c| c.display_name.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or(fallback);
        ServicePlan {
            id: plan.id().to_string(),
            name: plan.name().to_string(),
            description,
            metadata: PlanMetadata { display_name },
            schemas: ServiceSchemas {
                service_instance: InstanceSchemas {
                    create: SchemaParameters {
                        parameters: self.schema(plan, platform_region, platform_provider, false),
                    },
                    update: SchemaParameters {
                        parameters: self.schema(plan, platform_region, platform_provider, true),
                    },
                },
            },
        }
    }

    /// Enabled plans, sorted by name.
    pub fn plans(&self, registry: &PlanRegistry, platform_region: &str, platform_provider: CloudProvider) -> Vec<ServicePlan> {
        registry
            .enabled_sorted()
            .into_iter()
            .map(|plan| self.service_plan(plan, platform_region, platform_provider))
            .collect()
    }

    pub fn catalog(&self, registry: &PlanRegistry, platform_region: &str, platform_provider: CloudProvider) -> Catalog {
        Catalog {
            services: vec![Service {
                id: KYMA_SERVICE_ID.to_string(),
                name: KYMA_SERVICE_NAME.to_string(),
                description: SERVICE_DESCRIPTION.to_string(),
                bindable: false,
                instances_retrievable: true,
                allow_context_updates: true,
                tags: vec!["SAP".to_string(), "Kyma".to_string()],
                metadata: ServiceMetadata {
                    display_name: SERVICE_DISPLAY_NAME.to_string(),
                },
                plans: self.plans(registry, platform_region, platform_provider),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keb_core::EnablePlans;

    const PLANS: &str = r#"
["aws,build-runtime-aws,preview"]
regular_machines = ["m6i.large", "m6i.xlarge"]
additional_machines = ["m6i.large", "g6.xlarge"]
regions.default = ["eu-central-1", "us-east-1"]
regions.cf-eu11 = ["eu-central-1"]

[azure_lite]
regular_machines = ["Standard_D2s_v5", "Standard_D4s_v5"]
regions.default = ["westeurope"]
"#;

    const PROVIDERS: &str = r#"
[aws]
regions = [
  { name = "eu-central-1", display_name = "eu-central-1 (Europe, Frankfurt)", zones = ["a", "b", "c"] },
  { name = "us-east-1", display_name = "us-east-1 (US East, N. Virginia)", zones = ["a", "b", "c"] },
]
machines = { "m6i.large" = "m6i.large (2vCPU, 8GB RAM)", "g6.xlarge" = "g6.xlarge (1GPU, 4vCPU, 16GB RAM)*" }
"#;

    fn service(config: BrokerConfig) -> SchemaService {
        SchemaService::new(
            Arc::new(config),
            Arc::new(ProviderSpec::from_toml_str(PROVIDERS).unwrap()),
            Arc::new(PlanSpecifications::from_toml_str(PLANS).unwrap()),
        )
    }

    fn keys(v: &Value) -> Vec<String> {
        v["properties"].as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn aws_create_schema_shape() {
        let s = service(BrokerConfig::default()).schema(Plan::Aws, "cf-eu10", CloudProvider::Aws, false);
        assert_eq!(s["$schema"], DRAFT_04);
        assert_eq!(s["required"], json!(["name", "region"]));
        assert_eq!(
            s["_controlsOrder"],
            json!([
                "name",
                "region",
                "machineType",
                "autoScalerMin",
                "autoScalerMax",
                "additionalWorkerNodePools",
                "modules",
                "networking"
            ])
        );
        assert_eq!(s["properties"]["region"]["enum"], json!(["eu-central-1", "us-east-1"]));
        assert_eq!(s["properties"]["autoScalerMin"]["default"], 3);
        assert_eq!(
            s["properties"]["machineType"]["_enumDisplayName"]["m6i.large"],
            "m6i.large (2vCPU, 8GB RAM)"
        );
        assert!(s.get("additionalProperties").is_none());
    }

    #[test]
    fn region_restricted_by_platform_region() {
        let s = service(BrokerConfig::default()).schema(Plan::Aws, "cf-eu11", CloudProvider::Aws, false);
        assert_eq!(s["properties"]["region"]["enum"], json!(["eu-central-1"]));
    }

    #[test]
    fn update_schema_drops_create_only_fields_and_defaults() {
        let s = service(BrokerConfig::default()).schema(Plan::Aws, "", CloudProvider::Aws, true);
        assert_eq!(
            keys(&s),
            vec!["additionalWorkerNodePools", "autoScalerMax", "autoScalerMin", "machineType"]
        );
        assert!(s["properties"]["autoScalerMin"].get("default").is_none());
        assert!(s["properties"]["machineType"].get("readOnly").is_none());
    }

    #[test]
    fn machine_type_read_only_when_updates_disabled() {
        let mut config = BrokerConfig::default();
        config.broker.disable_machine_type_update = true;
        let s = service(config).schema(Plan::Aws, "", CloudProvider::Aws, true);
        assert_eq!(s["properties"]["machineType"]["readOnly"], true);
    }

    #[test]
    fn additional_params_and_flags() {
        let mut config = BrokerConfig::default();
        config.broker.include_additional_params_in_schema = true;
        config.broker.enable_shoot_and_seed_same_region = true;
        config.broker.reject_unsupported_parameters = true;
        config.infrastructure_manager.enable_ingress_filtering = true;
        config.infrastructure_manager.ingress_filtering_plans = EnablePlans::parse("aws").unwrap();
        let svc = service(config);

        let create = svc.schema(Plan::Aws, "", CloudProvider::Aws, false);
        for key in ["oidc", "administrators", "ingressFiltering", "shootAndSeedSameRegion"] {
            assert!(create["properties"].get(key).is_some(), "missing {key}");
        }
        assert_eq!(create["additionalProperties"], false);
        assert_eq!(create["properties"]["oidc"]["required"], json!(["clientID", "issuerURL"]));

        let update = svc.schema(Plan::Aws, "", CloudProvider::Aws, true);
        assert!(update["properties"].get("shootAndSeedSameRegion").is_none());
        assert!(update["properties"].get("ingressFiltering").is_some());

        let preview = svc.schema(Plan::Preview, "", CloudProvider::Aws, false);
        assert!(preview["properties"].get("ingressFiltering").is_none());
    }

    #[test]
    fn list_oidc_schema_carries_default_config() {
        let mut config = BrokerConfig::default();
        config.broker.include_additional_params_in_schema = true;
        config.broker.use_additional_oidc_schema = true;
        let s = service(config).schema(Plan::Aws, "", CloudProvider::Aws, false);
        let list = &s["properties"]["oidc"]["oneOf"][0]["properties"]["list"];
        assert_eq!(list["default"][0]["clientID"], "9bd05ed7-a930-44e6-8c79-e6defeb7dec9");
        assert_eq!(s["properties"]["oidc"]["oneOf"][1]["properties"]["clientID"]["readOnly"], true);
    }

    #[test]
    fn azure_lite_sizing() {
        let s = service(BrokerConfig::default()).schema(Plan::AzureLite, "", CloudProvider::Azure, false);
        let props = &s["properties"];
        assert_eq!(props["autoScalerMin"]["minimum"], 2);
        assert_eq!(props["autoScalerMax"]["maximum"], 40);
        assert_eq!(props["autoScalerMin"]["default"], 2);
        assert_eq!(props["autoScalerMax"]["default"], 10);
        assert_eq!(props["machineType"]["enum"], json!(["Standard_D4s_v5"]));
        let pool = &props["additionalWorkerNodePools"]["items"];
        assert!(pool["properties"].get("haZones").is_none());
        assert_eq!(
            pool["required"],
            json!(["name", "machineType", "autoScalerMin", "autoScalerMax"])
        );
    }

    #[test]
    fn trial_and_own_cluster_variants() {
        let svc = service(BrokerConfig::default());
        assert_eq!(svc.schema(Plan::Trial, "", CloudProvider::Aws, true), json!({}));
        let trial = svc.schema(Plan::Trial, "", CloudProvider::Aws, false);
        assert_eq!(trial["required"], json!(["name"]));
        assert_eq!(keys(&trial), vec!["modules", "name"]);

        let own = svc.schema(Plan::OwnCluster, "", CloudProvider::Aws, false);
        assert_eq!(own["required"], json!(["name", "kubeconfig", "shootName", "shootDomain"]));
        let own_update = svc.schema(Plan::OwnCluster, "", CloudProvider::Aws, true);
        assert_eq!(keys(&own_update), vec!["kubeconfig"]);
        assert!(own_update.get("required").is_none());
    }

    #[test]
    fn free_schema_uses_platform_provider_regions() {
        let s = service(BrokerConfig::default()).schema(Plan::Free, "", CloudProvider::Aws, false);
        assert_eq!(keys(&s), vec!["modules", "name", "networking", "region"]);
        assert_eq!(s["properties"]["region"]["enum"], json!(["eu-central-1", "us-east-1"]));
    }

    #[test]
    fn catalog_sorted_and_deterministic() {
        let svc = service(BrokerConfig::default());
        let registry = PlanRegistry::new(EnablePlans::parse("trial,aws,azure_lite").unwrap());
        let a = serde_json::to_string(&svc.catalog(&registry, "", CloudProvider::Aws)).unwrap();
        let b = serde_json::to_string(&svc.catalog(&registry, "", CloudProvider::Aws)).unwrap();
        assert_eq!(a, b);

        let catalog = svc.catalog(&registry, "", CloudProvider::Aws);
        let names: Vec<&str> = catalog.services[0].plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["aws", "azure_lite", "trial"]);
        assert_eq!(catalog.services[0].plans[0].metadata.display_name, "AWS");
    }
}
