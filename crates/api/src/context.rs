use stockroom_core::ActorId;

/// Who is acting on this request, as supplied by the `x-actor-id` header.
///
/// Requests without the header act anonymously; the ledger then records no
/// actor for the postings they cause.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: Option<ActorId>,
}

impl ActorContext {
    pub fn new(actor_id: Option<ActorId>) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }
}
