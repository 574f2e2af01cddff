use rand::seq::SliceRandom;
use rand::Rng;

pub const MIN_PORT: u16 = 1025;
pub const MAX_PORT: u16 = 65535;

/// Candidate remote ports for one punch attempt.
#[derive(Debug, Clone)]
pub struct PortPool {
    ports: Vec<u16>,
}

impl PortPool {
    /// Every usable port, in random order.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut ports: Vec<u16> = (MIN_PORT..=MAX_PORT).collect();
        ports.shuffle(rng);
        Self { ports }
    }

    pub fn from_ports(ports: Vec<u16>) -> Self {
        Self { ports }
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn candidates(&self, exclude: u16, n: usize) -> impl Iterator<Item = u16> + '_ {
        self.ports
            .iter()
            .copied()
            .filter(move |p| *p != exclude)
            .take(n)
    }
}
