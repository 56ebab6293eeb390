use canopy_core::ActorId;

/// Identity of the acting user for a request, carried into audit entries.
///
/// Populated from the `x-actor-id` header when present; requests without it
/// are anonymous but still accepted, authentication is handled upstream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<ActorId>,
}

impl ActorContext {
    pub fn new(actor: Option<ActorId>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Option<ActorId> {
        self.actor
    }
}
