//! Core type definitions for the intelligence graph

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant identifier. Every node, edge, embedding, snapshot and audit entry
/// belongs to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        TenantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tenant ids end up in storage key prefixes, so they must be non-empty
    /// and free of NUL bytes.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains('\0')
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $display:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($display, "({})"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a node, immutable once created
    NodeId,
    "NodeId"
);
uuid_id!(
    /// Unique identifier for an edge
    EdgeId,
    "EdgeId"
);
uuid_id!(
    /// Unique identifier for a graph snapshot
    SnapshotId,
    "SnapshotId"
);

/// Direction in which edges are followed from a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
    Both,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" | "out" => Ok(Direction::Outbound),
            "inbound" | "in" => Ok(Direction::Inbound),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Declares a closed string enumeration with a stable wire name per variant.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($name), " '{}'"), other)),
                }
            }
        }
    };
}

string_enum! {
    /// Kind of entity a node represents, grouped by the subsystem that emits it.
    pub enum NodeType {
        // content
        ContentAsset => "content_asset",
        Article => "article",
        BlogPost => "blog_post",
        SocialPost => "social_post",
        Video => "video",
        Podcast => "podcast",
        Newsletter => "newsletter",
        ContentBrief => "content_brief",
        ContentCalendarItem => "content_calendar_item",
        Topic => "topic",
        // pr
        Journalist => "journalist",
        MediaOutlet => "media_outlet",
        PressRelease => "press_release",
        MediaPitch => "media_pitch",
        Coverage => "coverage",
        MediaList => "media_list",
        Influencer => "influencer",
        Event => "event",
        // seo
        Keyword => "keyword",
        KeywordCluster => "keyword_cluster",
        SerpResult => "serp_result",
        Backlink => "backlink",
        Domain => "domain",
        WebPage => "web_page",
        Competitor => "competitor",
        SearchIntent => "search_intent",
        // persona
        Persona => "persona",
        AudienceSegment => "audience_segment",
        PainPoint => "pain_point",
        BuyingStage => "buying_stage",
        Person => "person",
        Organization => "organization",
        // executive reporting
        ExecutiveReport => "executive_report",
        Kpi => "kpi",
        Insight => "insight",
        Recommendation => "recommendation",
        Campaign => "campaign",
        Goal => "goal",
        // shared
        Entity => "entity",
        Source => "source",
    }
}

impl NodeType {
    /// Upstream subsystem that owns this node type
    pub fn subsystem(&self) -> &'static str {
        use NodeType::*;
        match self {
            ContentAsset | Article | BlogPost | SocialPost | Video | Podcast | Newsletter
            | ContentBrief | ContentCalendarItem | Topic => "content",
            Journalist | MediaOutlet | PressRelease | MediaPitch | Coverage | MediaList
            | Influencer | Event => "pr",
            Keyword | KeywordCluster | SerpResult | Backlink | Domain | WebPage | Competitor
            | SearchIntent => "seo",
            Persona | AudienceSegment | PainPoint | BuyingStage | Person | Organization => "persona",
            ExecutiveReport | Kpi | Insight | Recommendation | Campaign | Goal => "executive",
            Entity | Source => "shared",
        }
    }
}

string_enum! {
    /// Relationship type of a directed edge
    pub enum EdgeType {
        Cites => "cites",
        AuthoredBy => "authored_by",
        Mentions => "mentions",
        DerivedFrom => "derived_from",
        Supersedes => "supersedes",
        References => "references",
        LinksTo => "links_to",
        PublishedIn => "published_in",
        CoveredBy => "covered_by",
        PitchedTo => "pitched_to",
        WritesFor => "writes_for",
        Quotes => "quotes",
        RespondsTo => "responds_to",
        Targets => "targets",
        RanksFor => "ranks_for",
        CompetesWith => "competes_with",
        BelongsToCluster => "belongs_to_cluster",
        HasIntent => "has_intent",
        BacklinksTo => "backlinks_to",
        Addresses => "addresses",
        ResonatesWith => "resonates_with",
        MemberOf => "member_of",
        WorksFor => "works_for",
        Influences => "influences",
        Summarizes => "summarizes",
        Recommends => "recommends",
        Measures => "measures",
        ContributesTo => "contributes_to",
        PartOf => "part_of",
        RelatedTo => "related_to",
        SimilarTo => "similar_to",
        DuplicateOf => "duplicate_of",
        Promotes => "promotes",
        Sponsors => "sponsors",
        Attends => "attends",
        Follows => "follows",
        Amplifies => "amplifies",
    }
}

impl EdgeType {
    /// Edge types that may connect a node to itself, e.g. a revised node
    /// superseding its own earlier revision.
    pub const SELF_LOOP_WHITELIST: &'static [EdgeType] = &[EdgeType::Supersedes, EdgeType::References];

    pub fn allows_self_loop(&self) -> bool {
        Self::SELF_LOOP_WHITELIST.contains(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_parse() {
        let id = NodeId::new();
        assert!(format!("{}", id).starts_with("NodeId("));
        let parsed: NodeId = id.as_uuid().to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_tenant_validation() {
        assert!(TenantId::new("acme").is_valid());
        assert!(!TenantId::new("").is_valid());
        assert!(!TenantId::new("a\0b").is_valid());
    }

    #[test]
    fn test_type_catalogues() {
        assert_eq!(NodeType::ALL.len(), 40);
        assert_eq!(EdgeType::ALL.len(), 37);
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), *t);
        }
        for t in EdgeType::ALL {
            assert_eq!(t.as_str().parse::<EdgeType>().unwrap(), *t);
        }
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&EdgeType::AuthoredBy).unwrap(), "\"authored_by\"");
        assert_eq!(serde_json::from_str::<NodeType>("\"kpi\"").unwrap(), NodeType::Kpi);
        assert_eq!(NodeType::Journalist.subsystem(), "pr");
    }

    #[test]
    fn test_self_loop_whitelist() {
        assert!(EdgeType::Supersedes.allows_self_loop());
        assert!(!EdgeType::Cites.allows_self_loop());
    }
}
