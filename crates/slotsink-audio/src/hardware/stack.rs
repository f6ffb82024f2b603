//! Ordered, reversible ownership of device objects.

use tracing::debug;

use super::HwObject;

/// Device objects in creation order.
///
/// Released last-in first-out, so an object is always destroyed before the
/// objects it was created from.
#[derive(Default)]
pub struct ObjectStack {
    objects: Vec<Box<dyn HwObject>>,
}

impl ObjectStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: Box<dyn HwObject>) {
        debug!("Created {}", object.name());
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Destroy every object, newest first.
    pub fn release_all(&mut self) {
        while let Some(mut object) = self.objects.pop() {
            debug!("Destroying {}", object.name());
            object.destroy();
        }
    }
}

impl Drop for ObjectStack {
    fn drop(&mut self) {
        self.release_all();
    }
}
