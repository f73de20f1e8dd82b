use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::{error::ProtoError, limits::MAX_SERIALIZED_DESCRIPTOR_LEN};

/// Address of a network, exchanged out-of-band so that other devices can connect.
///
/// Its text form (see [`NetworkDescriptor::serialize`]) is printable ASCII and never longer than
/// [`MAX_SERIALIZED_DESCRIPTOR_LEN`], so it can be embedded in lobby properties.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Service-assigned network identifier.
    pub network_identifier: String,
    /// Region the network relay was allocated in.
    pub region_name: String,
    /// Opaque connection data understood only by the service.
    pub opaque_connection_info: Vec<u8>,
}

impl NetworkDescriptor {
    /// Encode into the printable text form.
    ///
    /// The layout is postcard bytes encoded as unpadded url-safe base64.
    pub fn serialize(&self) -> Result<String, ProtoError> {
        let bytes = postcard::to_stdvec(self)?;
        let text = URL_SAFE_NO_PAD.encode(bytes);
        if text.len() > MAX_SERIALIZED_DESCRIPTOR_LEN {
            return Err(ProtoError::DescriptorTooLong(text.len()));
        }
        Ok(text)
    }

    /// Decode the text form produced by [`NetworkDescriptor::serialize`].
    pub fn deserialize(text: &str) -> Result<Self, ProtoError> {
        if text.is_empty() {
            return Err(ProtoError::EmptyDescriptor);
        }
        if text.len() > MAX_SERIALIZED_DESCRIPTOR_LEN {
            return Err(ProtoError::DescriptorTooLong(text.len()));
        }
        if !text.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ProtoError::NotPrintable);
        }
        let bytes = URL_SAFE_NO_PAD.decode(text)?;
        Ok(postcard::from_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NetworkDescriptor {
        NetworkDescriptor {
            network_identifier: "7c1f0e2a".to_string(),
            region_name: "WestUs".to_string(),
            opaque_connection_info: vec![1, 2, 3, 250],
        }
    }

    #[test]
    fn text_form_is_printable() {
        let text = sample().serialize().unwrap();
        assert!(text.bytes().all(|b| b.is_ascii_graphic()));
        assert_eq!(NetworkDescriptor::deserialize(&text).unwrap(), sample());
    }

    #[test]
    fn oversized_descriptor_is_rejected() {
        let mut d = sample();
        d.opaque_connection_info = vec![0xAB; MAX_SERIALIZED_DESCRIPTOR_LEN];
        assert!(matches!(
            d.serialize(),
            Err(ProtoError::DescriptorTooLong(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(NetworkDescriptor::deserialize("").is_err());
        assert!(NetworkDescriptor::deserialize("not base64 at all!").is_err());
        assert!(NetworkDescriptor::deserialize("@@@@").is_err());
    }
}
