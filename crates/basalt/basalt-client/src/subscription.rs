use std::sync::{Arc, Mutex};

use crate::Image;

/// A registered inbound stream: `(channel, stream_id)` plus the set of
/// images currently delivering to it.
///
/// The image list is mutated only by the conductor thread as availability
/// events arrive; user threads take snapshots.
pub struct Subscription {
    channel: String,
    stream_id: i32,
    registration_id: i64,
    images: Mutex<Vec<Arc<Image>>>,
}

impl Subscription {
    pub(crate) fn new(channel: String, stream_id: i32, registration_id: i64) -> Self {
        Self {
            channel,
            stream_id,
            registration_id,
            images: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// For subscriptions the registration id equals the add correlation id.
    #[inline]
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().expect("subscription image lock").len()
    }

    /// A point-in-time snapshot of the image set.
    pub fn images(&self) -> Vec<Arc<Image>> {
        self.images.lock().expect("subscription image lock").clone()
    }

    pub(crate) fn add_image(&self, image: Arc<Image>) {
        self.images.lock().expect("subscription image lock").push(image);
    }

    pub(crate) fn remove_image(&self, correlation_id: i64) -> Option<Arc<Image>> {
        let mut images = self.images.lock().expect("subscription image lock");
        let index = images.iter().position(|i| i.correlation_id() == correlation_id)?;
        Some(images.swap_remove(index))
    }

    pub(crate) fn drain_images(&self) -> Vec<Arc<Image>> {
        let mut images = self.images.lock().expect("subscription image lock");
        std::mem::take(&mut *images)
    }
}
