use crate::domain::address::AddressFormat;
use crate::domain::ports::{RailRef, SettlementRail};
use crate::domain::record::RailKind;
use crate::error::{Result, SettlementError};

/// Chooses which rail services a destination address.
///
/// Policy, in order: native-format addresses go to the node rail, then the
/// explorer rail; token-format addresses go to the token rail. Selection is
/// re-evaluated on every attempt and never cached, so a rail that went down
/// between attempts is simply skipped.
pub struct RailSelector {
    rails: Vec<RailRef>,
}

impl RailSelector {
    pub fn new(rails: Vec<RailRef>) -> Self {
        Self { rails }
    }

    fn preference_for(format: AddressFormat) -> &'static [RailKind] {
        match format {
            AddressFormat::Native => &[RailKind::Node, RailKind::ExplorerApi],
            AddressFormat::TokenHex => &[RailKind::TokenContract],
        }
    }

    fn of_kind(&self, kind: RailKind) -> Option<&RailRef> {
        self.rails.iter().find(|r| r.kind() == kind)
    }

    /// The registered rail of the given kind, regardless of availability.
    /// Used by the confirmation monitor to poll the rail a record was
    /// dispatched through.
    pub fn by_kind(&self, kind: RailKind) -> Option<RailRef> {
        self.of_kind(kind).cloned()
    }

    /// Picks the first eligible rail for the address per policy.
    pub async fn select(&self, address: &str) -> Result<RailRef> {
        let Some(format) = AddressFormat::detect(address) else {
            return Err(SettlementError::InvalidAddress(address.to_string()));
        };
        for kind in Self::preference_for(format) {
            if let Some(rail) = self.of_kind(*kind) {
                if rail.is_available().await {
                    return Ok(rail.clone());
                }
            }
        }
        Err(SettlementError::NoRailAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testkit::MockRail;
    use std::sync::Arc;

    const NATIVE: &str = "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L";
    const TOKEN: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    fn selector(rails: Vec<Arc<MockRail>>) -> RailSelector {
        RailSelector::new(rails.into_iter().map(|r| r as RailRef).collect())
    }

    #[tokio::test]
    async fn test_node_preferred_for_native_addresses() {
        let node = Arc::new(MockRail::new(RailKind::Node));
        let explorer = Arc::new(MockRail::new(RailKind::ExplorerApi));
        let s = selector(vec![explorer, node]); // registration order irrelevant
        assert_eq!(s.select(NATIVE).await.unwrap().kind(), RailKind::Node);
    }

    #[tokio::test]
    async fn test_explorer_fallback_when_node_down() {
        let node = Arc::new(MockRail::new(RailKind::Node));
        node.set_available(false);
        let explorer = Arc::new(MockRail::new(RailKind::ExplorerApi));
        let s = selector(vec![node, explorer]);
        assert_eq!(s.select(NATIVE).await.unwrap().kind(), RailKind::ExplorerApi);
    }

    #[tokio::test]
    async fn test_token_rail_for_hex_addresses() {
        let node = Arc::new(MockRail::new(RailKind::Node));
        let token = Arc::new(MockRail::new(RailKind::TokenContract));
        let s = selector(vec![node, token]);
        assert_eq!(
            s.select(TOKEN).await.unwrap().kind(),
            RailKind::TokenContract
        );
    }

    #[tokio::test]
    async fn test_native_address_never_routed_to_token_rail() {
        let token = Arc::new(MockRail::new(RailKind::TokenContract));
        let s = selector(vec![token]);
        let err = s.select(NATIVE).await.err().unwrap();
        assert!(matches!(err, SettlementError::NoRailAvailable));
    }

    #[tokio::test]
    async fn test_empty_rail_set_yields_no_rail_available() {
        let s = RailSelector::new(Vec::new());
        let err = s.select(NATIVE).await.err().unwrap();
        assert!(matches!(err, SettlementError::NoRailAvailable));
    }

    #[tokio::test]
    async fn test_unparseable_address() {
        let node = Arc::new(MockRail::new(RailKind::Node));
        let s = selector(vec![node]);
        let err = s.select("junk").await.err().unwrap();
        assert!(matches!(err, SettlementError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_selection_reevaluated_per_attempt() {
        let node = Arc::new(MockRail::new(RailKind::Node));
        let explorer = Arc::new(MockRail::new(RailKind::ExplorerApi));
        let s = selector(vec![node.clone(), explorer]);

        assert_eq!(s.select(NATIVE).await.unwrap().kind(), RailKind::Node);
        node.set_available(false);
        assert_eq!(s.select(NATIVE).await.unwrap().kind(), RailKind::ExplorerApi);
        node.set_available(true);
        assert_eq!(s.select(NATIVE).await.unwrap().kind(), RailKind::Node);
    }
}
