//! Product editions and the features each one unlocks.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Sbo,
    Extended,
    Estimator,
}

impl Edition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edition::Sbo => "sbo",
            Edition::Extended => "extended",
            Edition::Estimator => "estimator",
        }
    }
}

impl std::str::FromStr for Edition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sbo" => Ok(Edition::Sbo),
            "extended" => Ok(Edition::Extended),
            "estimator" => Ok(Edition::Estimator),
            _ => Err(format!("Invalid edition: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Estimates,
    CostLibrary,
    Clients,
    Invoices,
    TimeTracking,
    Milestones,
    PurchaseOrders,
    ExportXlsx,
    ExportIfc,
    ExportCuf,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::Estimates,
        Feature::CostLibrary,
        Feature::Clients,
        Feature::Invoices,
        Feature::TimeTracking,
        Feature::Milestones,
        Feature::PurchaseOrders,
        Feature::ExportXlsx,
        Feature::ExportIfc,
        Feature::ExportCuf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Estimates => "estimates",
            Feature::CostLibrary => "cost_library",
            Feature::Clients => "clients",
            Feature::Invoices => "invoices",
            Feature::TimeTracking => "time_tracking",
            Feature::Milestones => "milestones",
            Feature::PurchaseOrders => "purchase_orders",
            Feature::ExportXlsx => "export_xlsx",
            Feature::ExportIfc => "export_ifc",
            Feature::ExportCuf => "export_cuf",
        }
    }
}

/// Resolved feature set of the running edition, held in application state.
#[derive(Debug, Clone, Serialize)]
pub struct EditionFeatures {
    pub edition: Edition,
    pub features: Vec<Feature>,
}

impl EditionFeatures {
    pub fn for_edition(edition: Edition) -> Self {
        let features = Feature::ALL
            .into_iter()
            .filter(|feature| Self::includes(edition, *feature))
            .collect();
        Self { edition, features }
    }

    fn includes(edition: Edition, feature: Feature) -> bool {
        use Feature::*;
        match edition {
            Edition::Extended => true,
            Edition::Sbo => !matches!(feature, Milestones | PurchaseOrders | ExportIfc | ExportCuf),
            Edition::Estimator => !matches!(
                feature,
                Invoices | TimeTracking | Milestones | PurchaseOrders
            ),
        }
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// 403 unless `feature` is part of this edition.
    pub fn require(&self, feature: Feature) -> Result<(), AppError> {
        if self.enabled(feature) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow!(
                "Feature '{}' is not available in the {} edition",
                feature.as_str(),
                self.edition.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_has_everything() {
        let features = EditionFeatures::for_edition(Edition::Extended);
        assert_eq!(features.features.len(), Feature::ALL.len());
    }

    #[test]
    fn sbo_lacks_project_extras_and_bim_exports() {
        let sbo = EditionFeatures::for_edition(Edition::Sbo);
        assert!(sbo.enabled(Feature::Invoices));
        assert!(sbo.enabled(Feature::TimeTracking));
        assert!(sbo.enabled(Feature::ExportXlsx));
        assert!(!sbo.enabled(Feature::Milestones));
        assert!(!sbo.enabled(Feature::PurchaseOrders));
        assert!(!sbo.enabled(Feature::ExportIfc));
        assert!(!sbo.enabled(Feature::ExportCuf));
    }

    #[test]
    fn estimator_has_no_project_administration() {
        let estimator = EditionFeatures::for_edition(Edition::Estimator);
        assert!(estimator.enabled(Feature::ExportIfc));
        assert!(estimator.enabled(Feature::CostLibrary));
        assert!(!estimator.enabled(Feature::Invoices));
        assert!(!estimator.enabled(Feature::TimeTracking));

        let err = estimator.require(Feature::Invoices).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(estimator.require(Feature::Estimates).is_ok());
    }

    #[test]
    fn edition_parsing() {
        assert_eq!("SBO".parse::<Edition>().unwrap(), Edition::Sbo);
        assert_eq!("estimator".parse::<Edition>().unwrap(), Edition::Estimator);
        assert!("enterprise".parse::<Edition>().is_err());
    }

    #[test]
    fn features_serialize_snake_case() {
        let json = serde_json::to_string(&Feature::PurchaseOrders).unwrap();
        assert_eq!(json, "\"purchase_orders\"");
    }
}
