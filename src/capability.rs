use serde::Serialize;

use crate::classfile::{ClassFile, ClassFileError};
use crate::config::WeaverConfig;

/// What one class contributes to the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub class_name: String,
    pub implementer: bool,
    pub collector: bool,
}

/// Matches classes against the registrar naming convention, the capability
/// interface and the collector marker annotation.
#[derive(Debug, Clone)]
pub struct CapabilityScanner {
    registrar_suffix: String,
    capability_interface: String,
    collector_annotation_suffix: String,
}

impl CapabilityScanner {
    pub fn new(config: &WeaverConfig) -> Self {
        Self {
            registrar_suffix: config.registrar_suffix.clone(),
            capability_interface: config.capability_interface.clone(),
            collector_annotation_suffix: config.collector_annotation_suffix.clone(),
        }
    }

    pub fn scan(&self, class: &ClassFile) -> Result<ScanOutcome, ClassFileError> {
        let class_name = class.name()?.into_owned();

        let implementer = class_name.ends_with(&self.registrar_suffix)
            && class
                .interface_names()?
                .iter()
                .any(|iface| *iface == self.capability_interface);

        let collector = class
            .annotation_descriptors()?
            .iter()
            .any(|desc| desc.ends_with(&self.collector_annotation_suffix));

        Ok(ScanOutcome {
            class_name,
            implementer,
            collector,
        })
    }

    pub fn scan_bytes(&self, bytes: &[u8]) -> Result<(ClassFile, ScanOutcome), ClassFileError> {
        let class = ClassFile::parse(bytes)?;
        let outcome = self.scan(&class)?;
        Ok((class, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFACE: &str = "com/kuaishou/commercial/utility/ioc/ICommercialServiceRegister";

    fn scanner() -> CapabilityScanner {
        CapabilityScanner::new(&WeaverConfig::default())
    }

    fn class_with(name: &str, interfaces: &[&str], annotations: &[&str]) -> ClassFile {
        let mut class = ClassFile::new(name, "java/lang/Object").unwrap();
        for iface in interfaces {
            class.add_interface(iface).unwrap();
        }
        for desc in annotations {
            class.add_annotation(desc, false).unwrap();
        }
        class
    }

    #[test]
    fn registrar_needs_suffix_and_interface() {
        let s = scanner();

        let both = class_with("feed/FeedCommercialServiceRegister", &[IFACE], &[]);
        assert!(s.scan(&both).unwrap().implementer);

        let no_iface = class_with(
            "feed/FeedCommercialServiceRegister",
            &["java/lang/Runnable"],
            &[],
        );
        assert!(!s.scan(&no_iface).unwrap().implementer);

        let no_suffix = class_with("feed/FeedRegistrar", &[IFACE], &[]);
        assert!(!s.scan(&no_suffix).unwrap().implementer);

        let none = class_with("feed/FeedCommercialServiceRegister", &[], &[]);
        assert!(!s.scan(&none).unwrap().implementer);
    }

    #[test]
    fn collector_is_detected_by_annotation_suffix() {
        let s = scanner();
        let collector = class_with(
            "com/kuaishou/commercial/utility/ioc/register/ServiceRegisterCollection",
            &[],
            &["Lcom/kuaishou/commercial/utility/ioc/register/RegisterCollector;"],
        );
        let outcome = s.scan(&collector).unwrap();
        assert!(outcome.collector);
        assert!(!outcome.implementer);

        let other = class_with("a/Plain", &[], &["Ljava/lang/Deprecated;"]);
        let outcome = s.scan(&other).unwrap();
        assert!(!outcome.collector && !outcome.implementer);
    }

    #[test]
    fn visible_annotations_count_too() {
        let mut class = ClassFile::new("a/Collector", "java/lang/Object").unwrap();
        class.add_annotation("La/RegisterCollector;", true).unwrap();
        assert!(scanner().scan(&class).unwrap().collector);
    }

    #[test]
    fn scan_bytes_propagates_parse_errors() {
        assert!(scanner().scan_bytes(b"not a class").is_err());
    }
}
