use avastream_core::LogicalMessage;

/// Message log in arrival order.
///
/// Chat is kept in full. Command/event notifications only keep the most
/// recent `system_cap`; older ones are evicted from the log.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: Vec<LogicalMessage>,
    system_cap: usize,
}

impl MessageLog {
    pub fn new(system_cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            system_cap,
        }
    }

    pub fn push(&mut self, msg: LogicalMessage) {
        let is_system = msg.is_system();
        self.entries.push(msg);
        if !is_system {
            return;
        }

        let mut excess = self.system_count().saturating_sub(self.system_cap);
        self.entries.retain(|m| {
            if excess > 0 && m.is_system() {
                excess -= 1;
                return false;
            }
            true
        });
    }

    pub fn entries(&self) -> &[LogicalMessage] {
        &self.entries
    }

    pub fn chat(&self) -> impl Iterator<Item = &LogicalMessage> {
        self.entries.iter().filter(|m| !m.is_system())
    }

    pub fn system(&self) -> impl Iterator<Item = &LogicalMessage> {
        self.entries.iter().filter(|m| m.is_system())
    }

    pub fn system_count(&self) -> usize {
        self.system().count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
