use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Broad family an element kind belongs to; drives its attribute schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindCategory {
    /// Recognized but never instantiable
    Abstract,
    Definition,
    Usage,
    Connector,
    Relationship,
    Membership,
    Annotation,
    Namespace,
}

macro_rules! element_kinds {
    ($($kind:ident => $category:ident),* $(,)?) => {
        /// Closed registry of element type tags the store accepts.
        ///
        /// Serialized as the bare tag (`"PartDefinition"`), the same string
        /// clients send in a payload's `@type`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ElementKind {
            $($kind),*
        }

        impl ElementKind {
            pub const ALL: &'static [ElementKind] = &[$(ElementKind::$kind),*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ElementKind::$kind => stringify!($kind)),*
                }
            }

            pub fn category(&self) -> KindCategory {
                match self {
                    $(ElementKind::$kind => KindCategory::$category),*
                }
            }
        }

        impl FromStr for ElementKind {
            type Err = StoreError;

            fn from_str(tag: &str) -> Result<Self, Self::Err> {
                match tag {
                    $(stringify!($kind) => Ok(ElementKind::$kind),)*
                    other => Err(StoreError::UnknownType(other.to_string())),
                }
            }
        }
    };
}

element_kinds! {
    // Abstract metaclasses
    Element => Abstract,
    Relationship => Abstract,
    Namespace => Abstract,
    Type => Abstract,
    Feature => Abstract,
    Classifier => Abstract,
    Definition => Abstract,
    Usage => Abstract,
    ConnectorAsUsage => Abstract,
    OccurrenceDefinition => Abstract,
    OccurrenceUsage => Abstract,

    // Requirements
    RequirementDefinition => Definition,
    RequirementUsage => Usage,
    SatisfyRequirementUsage => Usage,
    RequirementConstraintMembership => Membership,
    RequirementVerificationMembership => Membership,

    // Structure
    PartDefinition => Definition,
    PartUsage => Usage,
    PortDefinition => Definition,
    PortUsage => Usage,
    InterfaceDefinition => Definition,
    InterfaceUsage => Connector,
    ItemDefinition => Definition,
    ItemUsage => Usage,
    AttributeDefinition => Definition,
    AttributeUsage => Usage,

    // Connections
    ConnectionDefinition => Definition,
    ConnectionUsage => Connector,
    Connector => Connector,
    BindingConnector => Connector,
    BindingConnectorAsUsage => Connector,
    AllocationDefinition => Definition,
    AllocationUsage => Connector,

    // Behavior
    ActionDefinition => Definition,
    ActionUsage => Usage,
    StateDefinition => Definition,
    StateUsage => Usage,
    ExhibitStateUsage => Usage,
    TransitionUsage => Usage,
    PerformActionUsage => Usage,
    SuccessionAsUsage => Connector,
    ConstraintDefinition => Definition,
    ConstraintUsage => Usage,
    UseCaseDefinition => Definition,
    UseCaseUsage => Usage,

    // Cases and views
    AnalysisCaseDefinition => Definition,
    AnalysisCaseUsage => Usage,
    VerificationCaseDefinition => Definition,
    VerificationCaseUsage => Usage,
    ViewDefinition => Definition,
    ViewUsage => Usage,
    ViewpointDefinition => Definition,
    ViewpointUsage => Usage,

    // Packaging and structural relationships
    Package => Namespace,
    Dependency => Relationship,
    Specialization => Relationship,
    Subsetting => Relationship,
    Redefinition => Relationship,
    FeatureTyping => Relationship,
    Membership => Membership,
    OwningMembership => Membership,
    FeatureMembership => Membership,

    // Annotations
    Comment => Annotation,
    Documentation => Annotation,
}

/// Reference attributes every element may carry
const OWNERSHIP_REFERENCES: &[&str] = &[
    "owner",
    "owningNamespace",
    "owningMembership",
    "owningRelationship",
];

const DEFINITION_REFERENCES: &[&str] = &["general", "ownedUsage", "ownedPort"];

const USAGE_REFERENCES: &[&str] = &[
    "definition",
    "owningUsage",
    "owningDefinition",
    "featuringType",
    "subsettedFeature",
    "redefinedFeature",
];

const CONNECTOR_REFERENCES: &[&str] = &[
    "ends",
    "connectorEnd",
    "relatedFeature",
    "source",
    "target",
];

const RELATIONSHIP_REFERENCES: &[&str] = &[
    "source",
    "target",
    "relatedElement",
    "general",
    "specific",
    "subsettedFeature",
    "subsettingFeature",
    "redefinedFeature",
    "redefiningFeature",
    "type",
    "typedFeature",
    "client",
    "supplier",
];

const MEMBERSHIP_REFERENCES: &[&str] = &[
    "memberElement",
    "ownedMemberElement",
    "membershipOwningNamespace",
];

const ANNOTATION_REFERENCES: &[&str] = &["annotatedElement"];

const NAMESPACE_REFERENCES: &[&str] = &["ownedMember", "ownedElement"];

const SATISFY_REFERENCES: &[&str] = &[
    "satisfiedRequirement",
    "satisfyingSubject",
    "satisfyingFeature",
];

const TRANSITION_REFERENCES: &[&str] = &["source", "target", "trigger", "guard", "effect"];

const PERFORM_REFERENCES: &[&str] = &["performedAction"];

const EXHIBIT_REFERENCES: &[&str] = &["exhibitedState"];

/// Scalar attributes that must be strings (or null) on any element
pub const STRING_ATTRIBUTES: &[&str] = &[
    "name",
    "declaredName",
    "shortName",
    "declaredShortName",
    "humanId",
    "qualifiedName",
    "elementId",
];

/// Scalar attributes that must be booleans (or null) on any element
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "isAbstract",
    "isVariation",
    "isComposite",
    "isReference",
    "isDerived",
    "isEnd",
    "isOrdered",
    "isUnique",
    "isPortion",
    "isIndividual",
    "isConjugated",
    "isImplied",
    "isLibraryElement",
];

impl ElementKind {
    pub fn is_abstract(&self) -> bool {
        self.category() == KindCategory::Abstract
    }

    /// Resolve a payload's `@type` into a kind that may be instantiated
    pub fn instantiable(tag: &str) -> Result<Self, StoreError> {
        let kind: ElementKind = tag.parse()?;
        if kind.is_abstract() {
            return Err(StoreError::AbstractType(tag.to_string()));
        }
        Ok(kind)
    }

    fn category_references(&self) -> &'static [&'static str] {
        match self.category() {
            KindCategory::Abstract => &[],
            KindCategory::Definition => DEFINITION_REFERENCES,
            KindCategory::Usage => USAGE_REFERENCES,
            KindCategory::Connector => CONNECTOR_REFERENCES,
            KindCategory::Relationship => RELATIONSHIP_REFERENCES,
            KindCategory::Membership => MEMBERSHIP_REFERENCES,
            KindCategory::Annotation => ANNOTATION_REFERENCES,
            KindCategory::Namespace => NAMESPACE_REFERENCES,
        }
    }

    fn specific_references(&self) -> &'static [&'static str] {
        match self {
            ElementKind::SatisfyRequirementUsage => SATISFY_REFERENCES,
            ElementKind::TransitionUsage => TRANSITION_REFERENCES,
            ElementKind::PerformActionUsage => PERFORM_REFERENCES,
            ElementKind::ExhibitStateUsage => EXHIBIT_REFERENCES,
            // Connectors are usages too
            ElementKind::ConnectionUsage
            | ElementKind::InterfaceUsage
            | ElementKind::AllocationUsage
            | ElementKind::BindingConnectorAsUsage
            | ElementKind::SuccessionAsUsage => USAGE_REFERENCES,
            _ => &[],
        }
    }

    /// Attribute names whose values must be element references for this kind
    pub fn reference_attributes(&self) -> impl Iterator<Item = &'static str> {
        OWNERSHIP_REFERENCES
            .iter()
            .chain(self.category_references())
            .chain(self.specific_references())
            .copied()
    }

    pub fn is_reference_attribute(&self, name: &str) -> bool {
        self.reference_attributes().any(|attr| attr == name)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
