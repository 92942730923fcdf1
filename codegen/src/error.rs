use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Types inherit from each other: {}", .0.join(", "))]
    BaseCycle(Vec<String>),

    #[error("Error reading service description")]
    Wsdl(#[from] lather_wsdl::error::Error),

    #[error(transparent)]
    Runtime(#[from] lather_util::Error),
}
