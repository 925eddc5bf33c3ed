//! Instance metadata carried in registry tags
//!
//! The registrar publishes three values as prefixed tags on every
//! registration. The prefixes are a wire contract with the registrar and must
//! stay exactly as they are.

/// Prefix of the logical service (image) id tag
pub const IMAGE_PREFIX: &str = "image-";
/// Prefix of the routable hostname tag
pub const HOSTNAME_PREFIX: &str = "app-hostname-";
/// Prefix of the externally reachable port tag
pub const EXTERNAL_PORT_PREFIX: &str = "external-port-";

/// Typed view of the metadata tags of one instance
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub image_id: Option<i64>,
    pub routable_hostname: Option<String>,
    pub external_port: Option<u16>,
}

/// Decode metadata from a flat tag list.
///
/// Unknown tags are ignored. A tag whose value does not parse is skipped and
/// leaves the field unset. The first usable value of each field wins.
pub fn decode_tags<S: AsRef<str>>(tags: &[S]) -> InstanceMetadata {
    let mut metadata = InstanceMetadata::default();

    for tag in tags {
        let tag = tag.as_ref();

        if let Some(value) = tag.strip_prefix(IMAGE_PREFIX) {
            if metadata.image_id.is_none() {
                metadata.image_id = value.parse().ok();
            }
        } else if let Some(value) = tag.strip_prefix(HOSTNAME_PREFIX) {
            if metadata.routable_hostname.is_none() && !value.is_empty() {
                metadata.routable_hostname = Some(value.to_string());
            }
        } else if let Some(value) = tag.strip_prefix(EXTERNAL_PORT_PREFIX) {
            if metadata.external_port.is_none() {
                metadata.external_port = value.parse().ok();
            }
        }
    }

    metadata
}

/// Encode metadata into tags, in image / hostname / port order, skipping unset fields
pub fn encode_tags(metadata: &InstanceMetadata) -> Vec<String> {
    let mut tags = Vec::with_capacity(3);
    if let Some(image_id) = metadata.image_id {
        tags.push(format!("{}{}", IMAGE_PREFIX, image_id));
    }
    if let Some(hostname) = &metadata.routable_hostname {
        tags.push(format!("{}{}", HOSTNAME_PREFIX, hostname));
    }
    if let Some(port) = metadata.external_port {
        tags.push(format!("{}{}", EXTERNAL_PORT_PREFIX, port));
    }
    tags
}
