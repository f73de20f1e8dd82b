use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("descriptor is empty")]
    EmptyDescriptor,
    #[error("descriptor too long: {0} bytes")]
    DescriptorTooLong(usize),
    #[error("descriptor is not printable")]
    NotPrintable,
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("postcard decode error: {0}")]
    Postcard(#[from] postcard::Error),
}
