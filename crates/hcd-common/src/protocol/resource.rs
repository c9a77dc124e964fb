//! Resource addressing
//!
//! Every message targets a `(service, endpoint)` pair, written on the wire
//! as `"/service/endpoint"`. The appliances share a fixed catalogue of
//! resources, provided here as constants; anything else still decodes
//! through [`Resource::parse`].

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A protocol resource such as `/ro/values`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    service: Cow<'static, str>,
    endpoint: Cow<'static, str>,
}

impl Resource {
    /// Resource from static names, usable in constants
    pub const fn from_static(service: &'static str, endpoint: &'static str) -> Self {
        Self {
            service: Cow::Borrowed(service),
            endpoint: Cow::Borrowed(endpoint),
        }
    }

    pub fn new(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service: Cow::Owned(service.into()),
            endpoint: Cow::Owned(endpoint.into()),
        }
    }

    /// Decode the wire form.
    ///
    /// The leading segment before the first `/` is discarded, the next one
    /// is the service and everything after it the endpoint. Strings without
    /// separators yield an empty service and endpoint.
    pub fn parse(wire: &str) -> Self {
        let mut parts = wire.splitn(3, '/').skip(1);
        let service = parts.next().unwrap_or_default();
        let endpoint = parts.next().unwrap_or_default();
        Self::new(service, endpoint)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn to_wire(&self) -> String {
        format!("/{}/{}", self.service, self.endpoint)
    }

    /// Whether this resource is part of the well-known catalogue
    pub fn is_known(&self) -> bool {
        CATALOGUE.contains(self)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.endpoint)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = String::deserialize(deserializer)?;
        Ok(Resource::parse(&wire))
    }
}

// Remote operation
pub const RO_VALUES: Resource = Resource::from_static("ro", "values");
pub const RO_DESCRIPTION_CHANGE: Resource = Resource::from_static("ro", "descriptionChange");
pub const RO_ALL_MANDATORY_VALUES: Resource = Resource::from_static("ro", "allMandatoryValues");
pub const RO_ALL_DESCRIPTION_CHANGES: Resource = Resource::from_static("ro", "allDescriptionChanges");
pub const RO_ACTIVE_PROGRAM: Resource = Resource::from_static("ro", "activeProgram");
pub const RO_SELECTED_PROGRAM: Resource = Resource::from_static("ro", "selectedProgram");

// Entry interface
pub const EI_INITIAL_VALUES: Resource = Resource::from_static("ei", "initialValues");
pub const EI_DEVICE_READY: Resource = Resource::from_static("ei", "deviceReady");

// Connectivity interface
pub const CI_SERVICES: Resource = Resource::from_static("ci", "services");
pub const CI_REGISTERED_DEVICES: Resource = Resource::from_static("ci", "registeredDevices");
pub const CI_PAIRABLE_DEVICES: Resource = Resource::from_static("ci", "pairableDevices");
pub const CI_DELREGISTRATION: Resource = Resource::from_static("ci", "delregistration");
pub const CI_NETWORK_DETAILS: Resource = Resource::from_static("ci", "networkDetails");
pub const CI_NETWORK_DETAILS2: Resource = Resource::from_static("ci", "networkDetails2");
pub const CI_WIFI_NETWORKS: Resource = Resource::from_static("ci", "wifiNetworks");
pub const CI_WIFI_SETTING: Resource = Resource::from_static("ci", "wifiSetting");
pub const CI_WIFI_SETTING2: Resource = Resource::from_static("ci", "wifiSetting2");
pub const CI_TZ_INFO: Resource = Resource::from_static("ci", "tzInfo");
pub const CI_INFO: Resource = Resource::from_static("ci", "info");
pub const CI_AUTHENTICATION: Resource = Resource::from_static("ci", "authentication");
pub const CI_REGISTER: Resource = Resource::from_static("ci", "register");
pub const CI_DEREGISTER: Resource = Resource::from_static("ci", "deregister");

// Cloud endpoint
pub const CE_SERVER_DEVICE_TYPE: Resource = Resource::from_static("ce", "serverDeviceType");
pub const CE_SERVER_CREDENTIAL: Resource = Resource::from_static("ce", "serverCredential");
pub const CE_CLIENT_CREDENTIAL: Resource = Resource::from_static("ce", "clientCredential");
pub const CE_HUB_INFORMATION: Resource = Resource::from_static("ce", "hubInformation");
pub const CE_HUB_CONNECTED: Resource = Resource::from_static("ce", "hubConnected");
pub const CE_STATUS: Resource = Resource::from_static("ce", "status");

// Network interface
pub const NI_CONFIG: Resource = Resource::from_static("ni", "config");
pub const NI_INFO: Resource = Resource::from_static("ni", "info");

// Integrated module
pub const IZ_SERVICES: Resource = Resource::from_static("iz", "services");
pub const IZ_INFO: Resource = Resource::from_static("iz", "info");

/// All well-known resources
pub const CATALOGUE: &[Resource] = &[
    RO_VALUES,
    RO_DESCRIPTION_CHANGE,
    RO_ALL_MANDATORY_VALUES,
    RO_ALL_DESCRIPTION_CHANGES,
    RO_ACTIVE_PROGRAM,
    RO_SELECTED_PROGRAM,
    EI_INITIAL_VALUES,
    EI_DEVICE_READY,
    CI_SERVICES,
    CI_REGISTERED_DEVICES,
    CI_PAIRABLE_DEVICES,
    CI_DELREGISTRATION,
    CI_NETWORK_DETAILS,
    CI_NETWORK_DETAILS2,
    CI_WIFI_NETWORKS,
    CI_WIFI_SETTING,
    CI_WIFI_SETTING2,
    CI_TZ_INFO,
    CI_INFO,
    CI_AUTHENTICATION,
    CI_REGISTER,
    CI_DEREGISTER,
    CE_SERVER_DEVICE_TYPE,
    CE_SERVER_CREDENTIAL,
    CE_CLIENT_CREDENTIAL,
    CE_HUB_INFORMATION,
    CE_HUB_CONNECTED,
    CE_STATUS,
    NI_CONFIG,
    NI_INFO,
    IZ_SERVICES,
    IZ_INFO,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_wire_roundtrip() {
        for resource in CATALOGUE {
            let wire = resource.to_wire();
            assert_eq!(&Resource::parse(&wire), resource, "{}", wire);
        }
    }

    #[test]
    fn test_parse_owned_equals_constant() {
        assert_eq!(Resource::parse("/ro/values"), RO_VALUES);
        assert_eq!(Resource::new("ci", "services"), CI_SERVICES);
        assert!(Resource::parse("/ei/initialValues").is_known());
    }

    #[test]
    fn test_parse_malformed() {
        let r = Resource::parse("garbage");
        assert_eq!(r.service(), "");
        assert_eq!(r.endpoint(), "");

        let r = Resource::parse("/ro");
        assert_eq!(r.service(), "ro");
        assert_eq!(r.endpoint(), "");
    }

    #[test]
    fn test_parse_keeps_nested_endpoint() {
        let r = Resource::parse("/xx/a/b");
        assert_eq!(r.service(), "xx");
        assert_eq!(r.endpoint(), "a/b");
        assert_eq!(r.to_wire(), "/xx/a/b");
        assert!(!r.is_known());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&RO_SELECTED_PROGRAM).unwrap();
        assert_eq!(json, "\"/ro/selectedProgram\"");
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RO_SELECTED_PROGRAM);
    }
}
