pub mod cpu_oversell;
pub mod dns_config;

pub use cpu_oversell::CpuOversell;
pub use dns_config::DnsConfig;
