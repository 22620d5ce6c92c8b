use super::test_helpers::*;
use super::*;
use crate::config::EvictionPolicy;
use crate::error::StorageError;
use crate::types::{ContentId, ContentKind, DownloadRequest, Event};
use std::time::Duration;

mod control;
mod queue;
