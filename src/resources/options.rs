//! Per-registration resource options.

use super::Resource;

#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Parent resource; the child's URN nests under the parent's type.
    pub parent: Option<Resource>,
    /// Explicit dependencies on top of those found in the arguments.
    pub depends_on: Vec<Resource>,
    pub protect: bool,
    /// Provider resource to use instead of the default provider.
    pub provider: Option<Resource>,
    /// Plugin version for the resource's package.
    pub version: Option<String>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: Resource) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn depends_on(mut self, resource: Resource) -> Self {
        self.depends_on.push(resource);
        self
    }

    pub fn protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    pub fn provider(mut self, provider: Resource) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
