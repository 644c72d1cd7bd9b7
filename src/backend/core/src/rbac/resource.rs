//! Resource hierarchy adapter.
//!
//! Every governed resource exposes a globally unique identity (its UID) and,
//! for pack-owned types, the UID of the owning pack. UIDs are derived from
//! the resource type and name:
//!
//! | Type   | UID                          |
//! |--------|------------------------------|
//! | pack   | `pack:<ref>`                 |
//! | sensor | `sensor_type:<pack>:<name>`  |
//! | action | `action:<pack>:<name>`       |
//! | rule   | `rule:<pack>:<name>`         |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::ResourceType;
use crate::error::{ErrorCode, ErrorDetails, RbacError, Result};

/// Separator between UID segments.
pub const UID_SEPARATOR: char = ':';

// ═══════════════════════════════════════════════════════════════════════════════
// Resource UID
// ═══════════════════════════════════════════════════════════════════════════════

/// A validated resource UID. The encoded resource type is always known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUid {
    value: String,
    resource_type: ResourceType,
}

impl ResourceUid {
    /// UID of a pack.
    pub fn pack(pack_ref: &str) -> Result<Self> {
        validate_pack_ref(pack_ref)?;
        Ok(Self::pack_unchecked(pack_ref))
    }

    /// UID of a pack-owned resource.
    pub fn child(resource_type: ResourceType, pack_ref: &str, name: &str) -> Result<Self> {
        if !resource_type.is_pack_child() {
            return Err(RbacError::new(
                ErrorCode::ResourceTypeMismatch,
                format!("Resource type {} is not owned by a pack", resource_type),
            ));
        }
        validate_pack_ref(pack_ref)?;
        validate_name(name)?;
        Ok(Self::child_unchecked(resource_type, pack_ref, name))
    }

    fn pack_unchecked(pack_ref: &str) -> Self {
        Self {
            value: format!("{}{}{}", ResourceType::Pack, UID_SEPARATOR, pack_ref),
            resource_type: ResourceType::Pack,
        }
    }

    fn child_unchecked(resource_type: ResourceType, pack_ref: &str, name: &str) -> Self {
        Self {
            value: format!(
                "{}{sep}{}{sep}{}",
                resource_type,
                pack_ref,
                name,
                sep = UID_SEPARATOR
            ),
            resource_type,
        }
    }

    /// Parse and validate a UID string.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            RbacError::invalid_argument(format!("Invalid resource uid '{}': {}", value, reason))
        };

        let (prefix, rest) = value
            .split_once(UID_SEPARATOR)
            .ok_or_else(|| invalid("missing type prefix"))?;
        let resource_type: ResourceType = prefix.parse()?;

        if resource_type.is_pack_child() {
            let (pack, name) = rest
                .split_once(UID_SEPARATOR)
                .ok_or_else(|| invalid("expected <type>:<pack>:<name>"))?;
            if pack.is_empty() || name.is_empty() {
                return Err(invalid("empty pack or name"));
            }
        } else if rest.is_empty() || rest.contains(UID_SEPARATOR) {
            return Err(invalid("expected pack:<ref>"));
        }

        Ok(Self {
            value: value.to_string(),
            resource_type,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The resource type encoded in the prefix.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// For child UIDs, the UID of the owning pack, derived from the UID itself.
    pub fn owning_pack(&self) -> Option<ResourceUid> {
        if !self.resource_type.is_pack_child() {
            return None;
        }
        let mut parts = self.value.splitn(3, UID_SEPARATOR);
        parts.next();
        parts.next().map(ResourceUid::pack_unchecked)
    }
}

/// Pack refs form one UID segment, so they may not contain the separator.
fn validate_pack_ref(pack_ref: &str) -> Result<()> {
    if pack_ref.is_empty() || pack_ref.contains(UID_SEPARATOR) {
        return Err(RbacError::invalid_argument(format!(
            "Invalid pack ref '{}': must be non-empty and contain no '{}'",
            pack_ref, UID_SEPARATOR
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RbacError::invalid_argument("Resource name must not be empty"));
    }
    Ok(())
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for ResourceUid {
    type Err = RbacError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceUid {
    type Error = RbacError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceUid> for String {
    fn from(value: ResourceUid) -> Self {
        value.value
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource capability interface
// ═══════════════════════════════════════════════════════════════════════════════

/// What the resolver needs to know about a resource.
pub trait RbacResource: Send + Sync {
    /// Globally unique identity.
    fn uid(&self) -> ResourceUid;

    fn resource_type(&self) -> ResourceType;

    /// UID of the structural parent, if this type has one.
    fn parent_uid(&self) -> Option<ResourceUid>;
}

/// A concrete resource struct that always has the same resource type.
pub trait TypedResource: RbacResource {
    const RESOURCE_TYPE: ResourceType;
}

/// A pack: the container for sensors, actions and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PackRecord")]
pub struct Pack {
    #[serde(rename = "ref")]
    pack_ref: String,
}

#[derive(Deserialize)]
struct PackRecord {
    #[serde(rename = "ref")]
    pack_ref: String,
}

impl TryFrom<PackRecord> for Pack {
    type Error = RbacError;

    fn try_from(record: PackRecord) -> std::result::Result<Self, Self::Error> {
        Self::new(record.pack_ref)
    }
}

impl Pack {
    pub fn new(pack_ref: impl Into<String>) -> Result<Self> {
        let pack_ref = pack_ref.into();
        validate_pack_ref(&pack_ref)?;
        Ok(Self { pack_ref })
    }

    pub fn pack_ref(&self) -> &str {
        &self.pack_ref
    }
}

impl TypedResource for Pack {
    const RESOURCE_TYPE: ResourceType = ResourceType::Pack;
}

impl RbacResource for Pack {
    fn uid(&self) -> ResourceUid {
        ResourceUid::pack_unchecked(&self.pack_ref)
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Pack
    }

    fn parent_uid(&self) -> Option<ResourceUid> {
        None
    }
}

/// Wire form of a pack-owned resource, validated on the way in.
#[derive(Deserialize)]
struct PackChildRecord {
    pack: String,
    name: String,
}

macro_rules! pack_child_resource {
    ($(#[$meta:meta])* $name:ident, $resource_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "PackChildRecord")]
        pub struct $name {
            pack: String,
            name: String,
        }

        impl $name {
            /// The owning pack is fixed here and cannot be reassigned.
            pub fn new(pack: impl Into<String>, name: impl Into<String>) -> Result<Self> {
                let (pack, name) = (pack.into(), name.into());
                validate_pack_ref(&pack)?;
                validate_name(&name)?;
                Ok(Self { pack, name })
            }

            pub fn pack(&self) -> &str {
                &self.pack
            }

            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl TryFrom<PackChildRecord> for $name {
            type Error = RbacError;

            fn try_from(record: PackChildRecord) -> std::result::Result<Self, Self::Error> {
                Self::new(record.pack, record.name)
            }
        }

        impl TypedResource for $name {
            const RESOURCE_TYPE: ResourceType = $resource_type;
        }

        impl RbacResource for $name {
            fn uid(&self) -> ResourceUid {
                ResourceUid::child_unchecked($resource_type, &self.pack, &self.name)
            }

            fn resource_type(&self) -> ResourceType {
                $resource_type
            }

            fn parent_uid(&self) -> Option<ResourceUid> {
                Some(ResourceUid::pack_unchecked(&self.pack))
            }
        }
    };
}

pack_child_resource!(
    /// A sensor type registered by a pack.
    SensorType,
    ResourceType::Sensor
);
pack_child_resource!(
    /// An action shipped by a pack.
    Action,
    ResourceType::Action
);
pack_child_resource!(
    /// A rule shipped by a pack.
    Rule,
    ResourceType::Rule
);

// ═══════════════════════════════════════════════════════════════════════════════
// Type-erased reference
// ═══════════════════════════════════════════════════════════════════════════════

/// A resource identified only by type and UID, as handed over by API layers.
///
/// When `parent_uid` is absent for a pack-owned type, the resolver asks the
/// store for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub uid: ResourceUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<ResourceUid>,
}

impl ResourceRef {
    /// Build a reference, checking that the UID encodes `resource_type`.
    pub fn new(resource_type: ResourceType, uid: ResourceUid) -> Result<Self> {
        if uid.resource_type() != resource_type {
            return Err(RbacError::new(
                ErrorCode::ResourceTypeMismatch,
                format!(
                    "Resource uid '{}' does not refer to a {}",
                    uid, resource_type
                ),
            ));
        }
        Ok(Self {
            resource_type,
            uid,
            parent_uid: None,
        })
    }

    /// Attach an already known parent UID.
    pub fn with_parent(mut self, parent_uid: ResourceUid) -> Result<Self> {
        if !self.resource_type.is_pack_child() {
            return Err(RbacError::invalid_argument(format!(
                "Resource type {} has no parent",
                self.resource_type
            )));
        }
        check_owning_pack(&self.uid, &parent_uid)?;
        self.parent_uid = Some(parent_uid);
        Ok(self)
    }

    /// Build a reference from any concrete resource.
    pub fn from_resource(resource: &dyn RbacResource) -> Self {
        Self {
            resource_type: resource.resource_type(),
            uid: resource.uid(),
            parent_uid: resource.parent_uid(),
        }
    }
}

/// A child's parent must be the pack its UID names.
pub(crate) fn check_owning_pack(uid: &ResourceUid, parent_uid: &ResourceUid) -> Result<()> {
    if parent_uid.resource_type() != ResourceType::Pack {
        return Err(RbacError::new(
            ErrorCode::ResourceTypeMismatch,
            format!("Parent uid '{}' of {} is not a pack", parent_uid, uid),
        ));
    }
    if uid.owning_pack().as_ref() != Some(parent_uid) {
        return Err(RbacError::new(
            ErrorCode::ResourceTypeMismatch,
            format!("Parent uid '{}' does not own {}", parent_uid, uid),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("resource", uid.as_str())
                .with_context("parent_uid", parent_uid.as_str()),
        ));
    }
    Ok(())
}

impl RbacResource for ResourceRef {
    fn uid(&self) -> ResourceUid {
        self.uid.clone()
    }

    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn parent_uid(&self) -> Option<ResourceUid> {
        self.parent_uid.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uids() {
        assert_eq!(Pack::new("test_pack_1").unwrap().uid().as_str(), "pack:test_pack_1");
        assert_eq!(
            SensorType::new("test_pack_1", "sensor1").unwrap().uid().as_str(),
            "sensor_type:test_pack_1:sensor1"
        );
        assert_eq!(
            Action::new("test_pack_2", "action3").unwrap().uid().as_str(),
            "action:test_pack_2:action3"
        );
        assert_eq!(Rule::new("p", "r").unwrap().uid().as_str(), "rule:p:r");
    }

    #[test]
    fn test_parent_uid() {
        assert_eq!(Pack::new("p1").unwrap().parent_uid(), None);
        assert_eq!(
            Rule::new("p1", "rule1").unwrap().parent_uid(),
            Some(ResourceUid::pack("p1").unwrap())
        );
        assert_eq!(
            Action::new("p2", "a1").unwrap().parent_uid().unwrap().as_str(),
            "pack:p2"
        );
    }

    #[test]
    fn test_uid_parse() {
        let uid = ResourceUid::parse("action:core:local").unwrap();
        assert_eq!(uid.resource_type(), ResourceType::Action);
        assert_eq!(uid.owning_pack(), Some(ResourceUid::pack("core").unwrap()));

        let uid = ResourceUid::parse("pack:core").unwrap();
        assert_eq!(uid.resource_type(), ResourceType::Pack);
        assert_eq!(uid.owning_pack(), None);

        // Names may contain the separator, pack refs may not.
        assert!(ResourceUid::parse("rule:core:weird:name").is_ok());
        assert!(ResourceUid::parse("pack:a:b").is_err());
    }

    #[test]
    fn test_uid_parse_rejects_garbage() {
        for bad in ["", "pack", "pack:", "action:core", "action::x", "rule:p:", "nope:x"] {
            assert!(ResourceUid::parse(bad).is_err(), "input: {bad}");
        }
        assert_eq!(
            ResourceUid::parse("widget:x").unwrap_err().code(),
            ErrorCode::UnknownResourceType
        );
    }

    #[test]
    fn test_pack_refs_cannot_contain_separator() {
        for bad in ["", "p1:x", ":"] {
            assert_eq!(Pack::new(bad).unwrap_err().code(), ErrorCode::InvalidArgument);
            assert_eq!(ResourceUid::pack(bad).unwrap_err().code(), ErrorCode::InvalidArgument);
            assert!(Action::new(bad, "y").is_err(), "pack: {bad}");
        }
        assert!(Rule::new("p1", "").is_err());
        assert!(ResourceUid::child(ResourceType::Pack, "p1", "x").is_err());
    }

    #[test]
    fn test_distinct_resources_have_distinct_uids() {
        // The only way to spell action:p1:x:y is pack p1, name x:y.
        assert!(Action::new("p1:x", "y").is_err());
        let action = Action::new("p1", "x:y").unwrap();
        assert_eq!(action.uid().as_str(), "action:p1:x:y");
        assert_eq!(action.uid().owning_pack(), action.parent_uid());
    }

    #[test]
    fn test_every_constructed_uid_parses_back() {
        let resources: Vec<Box<dyn RbacResource>> = vec![
            Box::new(Pack::new("p1").unwrap()),
            Box::new(SensorType::new("p1", "s:1").unwrap()),
            Box::new(Action::new("p1", "a1").unwrap()),
            Box::new(Rule::new("p1", "r1").unwrap()),
        ];
        for resource in resources {
            let uid = resource.uid();
            assert_eq!(ResourceUid::parse(uid.as_str()).unwrap(), uid);
            assert_eq!(uid.owning_pack(), resource.parent_uid());
        }
    }

    #[test]
    fn test_resource_ref_type_mismatch() {
        let err = ResourceRef::new(ResourceType::Sensor, ResourceUid::pack("p1").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceTypeMismatch);

        let err = ResourceRef::new(ResourceType::Pack, ResourceUid::pack("p1").unwrap())
            .unwrap()
            .with_parent(ResourceUid::pack("p0").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_resource_ref_parent_must_own_uid() {
        let uid = ResourceUid::parse("action:p2:a1").unwrap();
        let reference = ResourceRef::new(ResourceType::Action, uid).unwrap();

        let err = reference
            .clone()
            .with_parent(ResourceUid::pack("p1").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceTypeMismatch);

        let err = reference
            .clone()
            .with_parent(ResourceUid::parse("rule:p2:r1").unwrap())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceTypeMismatch);

        let ok = reference.with_parent(ResourceUid::pack("p2").unwrap()).unwrap();
        assert_eq!(ok.parent_uid, Some(ResourceUid::pack("p2").unwrap()));
    }

    #[test]
    fn test_resource_ref_from_resource() {
        let sensor = SensorType::new("p1", "s1").unwrap();
        let r = ResourceRef::from_resource(&sensor);
        assert_eq!(r.resource_type, ResourceType::Sensor);
        assert_eq!(r.uid, sensor.uid());
        assert_eq!(r.parent_uid, Some(ResourceUid::pack("p1").unwrap()));
    }

    #[test]
    fn test_uid_serde() {
        let uid = ResourceUid::child(ResourceType::Rule, "p1", "r1").unwrap();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"rule:p1:r1\"");
        let back: ResourceUid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uid);
        assert!(serde_json::from_str::<ResourceUid>("\"rule:p1\"").is_err());
    }

    #[test]
    fn test_resource_serde_validates() {
        let pack: Pack = serde_json::from_str(r#"{"ref":"core"}"#).unwrap();
        assert_eq!(pack.pack_ref(), "core");
        assert!(serde_json::from_str::<Pack>(r#"{"ref":"a:b"}"#).is_err());

        let action: Action = serde_json::from_str(r#"{"pack":"core","name":"local"}"#).unwrap();
        assert_eq!(action.uid().as_str(), "action:core:local");
        assert!(serde_json::from_str::<Action>(r#"{"pack":"core:x","name":"local"}"#).is_err());
    }
}
