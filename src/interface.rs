use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum InterfaceMode {
    #[default]
    Serial,
    Simulation,
}

impl InterfaceMode {
    pub const fn needs_port(self) -> bool {
        matches!(self, Self::Serial)
    }
}
