use std::sync::Arc;

use crate::application::publish::PublishService;
use crate::cache::ResponseCache;

#[derive(Clone)]
pub struct AdminState {
    pub publish: Arc<PublishService>,
    pub cache: ResponseCache,
}
