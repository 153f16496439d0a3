use json_store::StoreError;
use json_store_path::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("list container must have exactly one child to use as the item template, found {0}")]
    ContainerShape(usize),
    #[error("<template> must hold exactly one element, found {0}")]
    TemplateShape(usize),
    #[error("list binding is already updating")]
    Reentrant,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid path: {0}")]
    Path(#[from] PathError),
    #[error("invalid list config: {0}")]
    Config(#[from] toml::de::Error),
}
