pub(crate) use crate::error::{Error, Result};
