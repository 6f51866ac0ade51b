// Nanoid-based id generation for organizations, memberships, and tokens.

/// Generate a unique 21-character id.
pub fn generate_id() -> String {
    nanoid::nanoid!()
}

/// Generate an id with a custom length (invite tokens use 32).
pub fn generate_id_with_length(len: usize) -> String {
    nanoid::nanoid!(len)
}
