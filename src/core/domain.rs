//! Closed value domains for recognized template parameters

use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::params::ParamValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PLATFORM: &str = "platform";
pub const TEST_RUN_TYPE: &str = "testRunType";
pub const INSTALLATION_TYPE: &str = "installationType";
pub const PIN_REQUIREMENTS: &str = "pinRequirements";
pub const FREEZE_ARTIFACT_STEM: &str = "freezeArtifactStem";
pub const FREEZE_FILE_STEM: &str = "freezeFileStem";
pub const TARGET_TYPE: &str = "targetType";
pub const PYPI_URL: &str = "pypiUrl";

/// Staging package index used for release candidates
pub const TEST_PYPI_URL: &str = "https://test.pypi.org/legacy/";

/// Production package index
pub const PROD_PYPI_URL: &str = "https://upload.pypi.org/legacy/";

/// Kind of test run a validation job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestRunType {
    Unit,
    Notebooks,
}

/// How the package under test gets installed before tests run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallationType {
    None,
    PipLocal,
    PyPI,
}

/// Package index a deployment stage publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Test,
    Prod,
}

/// A closed enumeration parsed from its exact string label
pub trait ClosedDomain: Sized + Copy + 'static {
    /// Every member, in declaration order
    const MEMBERS: &'static [Self];

    /// Exact label as it appears in templates
    fn label(self) -> &'static str;

    fn parse_label(value: &str) -> Option<Self> {
        Self::MEMBERS.iter().copied().find(|m| m.label() == value)
    }

    fn expected() -> String {
        Self::MEMBERS
            .iter()
            .map(|m| m.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ClosedDomain for TestRunType {
    const MEMBERS: &'static [Self] = &[TestRunType::Unit, TestRunType::Notebooks];

    fn label(self) -> &'static str {
        match self {
            TestRunType::Unit => "Unit",
            TestRunType::Notebooks => "Notebooks",
        }
    }
}

impl ClosedDomain for InstallationType {
    const MEMBERS: &'static [Self] = &[
        InstallationType::None,
        InstallationType::PipLocal,
        InstallationType::PyPI,
    ];

    fn label(self) -> &'static str {
        match self {
            InstallationType::None => "None",
            InstallationType::PipLocal => "PipLocal",
            InstallationType::PyPI => "PyPI",
        }
    }
}

impl ClosedDomain for TargetType {
    const MEMBERS: &'static [Self] = &[TargetType::Test, TargetType::Prod];

    fn label(self) -> &'static str {
        match self {
            TargetType::Test => "Test",
            TargetType::Prod => "Prod",
        }
    }
}

macro_rules! domain_str_impls {
    ($($ty:ty => $param:expr),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.label())
                }
            }

            impl FromStr for $ty {
                type Err = ExpansionError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    <$ty>::parse_label(s).ok_or_else(|| ExpansionError::InvalidParameterValue {
                        name: $param.to_string(),
                        value: s.to_string(),
                        expected: <$ty>::expected(),
                    })
                }
            }
        )*
    };
}

domain_str_impls!(
    TestRunType => TEST_RUN_TYPE,
    InstallationType => INSTALLATION_TYPE,
    TargetType => TARGET_TYPE,
);

/// Upload URL selected by a deployment target
pub fn pypi_url(target: TargetType) -> &'static str {
    match target {
        TargetType::Test => TEST_PYPI_URL,
        TargetType::Prod => PROD_PYPI_URL,
    }
}

/// Labels of the closed domain a parameter belongs to, if it is recognized
pub fn domain_of(parameter: &str) -> Option<Vec<&'static str>> {
    fn labels<T: ClosedDomain>() -> Vec<&'static str> {
        T::MEMBERS.iter().map(|m| m.label()).collect()
    }

    match parameter {
        TEST_RUN_TYPE => Some(labels::<TestRunType>()),
        INSTALLATION_TYPE => Some(labels::<InstallationType>()),
        TARGET_TYPE => Some(labels::<TargetType>()),
        _ => None,
    }
}

/// Parse a parameter value into its closed domain
///
/// Only string values can be members; booleans and lists never are.
pub fn parse_value<T>(parameter: &str, value: &ParamValue) -> ExpansionResult<T>
where
    T: ClosedDomain + FromStr<Err = ExpansionError>,
{
    match value {
        ParamValue::Str(s) => s.parse(),
        other => Err(ExpansionError::InvalidParameterValue {
            name: parameter.to_string(),
            value: other.render(),
            expected: T::expected(),
        }),
    }
}

/// Check a resolved value against its closed domain
///
/// `testRunType` is not checked here; an unknown test run type becomes a
/// failing guard step in the composed job.
pub fn validate_value(parameter: &str, value: &ParamValue) -> ExpansionResult<()> {
    match parameter {
        INSTALLATION_TYPE => parse_value::<InstallationType>(parameter, value).map(|_| ()),
        TARGET_TYPE => parse_value::<TargetType>(parameter, value).map(|_| ()),
        _ => Ok(()),
    }
}
