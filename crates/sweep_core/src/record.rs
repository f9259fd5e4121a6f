/// One extracted unit of domain data.
///
/// The identity is derived from stable content (visible text or a
/// DOM-provided id), never from the node's position on screen, because
/// virtualized lists recycle positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    identity: String,
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append. Field order is kept for export columns.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Replaces the value of an existing field or appends a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}
