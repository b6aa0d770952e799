use crate::error::RegistryError;
use crate::registry::Registry;

/// Extension point for bundles of tasks, sinks or plans.
///
/// A provider registers everything it contributes in one call. Providers are
/// installed explicitly; nothing is discovered by inspecting types at runtime.
pub trait TaskProvider {
  /// Name used in logs.
  fn name(&self) -> &str;

  fn install(&self, registry: &mut Registry) -> Result<(), RegistryError>;
}
