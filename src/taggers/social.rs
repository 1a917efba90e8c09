//! Social-influence labels.
//!
//! Social activity is optional: when no source is wired the address is
//! treated as having no footprint at all (`SocialActivity::NEUTRAL`), which
//! rules out the influence labels and favours silent whale.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Tagger, TaggerContext};
use crate::capability::settle;
use crate::config::{active, CommunityLeaderRule, CopyTargetRule, KolRule, SilentWhaleRule, SocialRules};
use crate::types::{EntityProfile, LabelName, LabelResult, SocialActivity};

/// Win rate that makes an address worth copying without any social presence.
const STANDALONE_COPY_WIN_RATE: f64 = 0.75;

pub struct SocialTagger {
    ctx: TaggerContext,
    rules: SocialRules,
}

fn saturating(value: u64, at: f64) -> f64 {
    (value as f64 / at).min(1.0)
}

impl SocialTagger {
    pub fn new(ctx: TaggerContext, rules: SocialRules) -> Self {
        Self { ctx, rules }
    }

    fn kol(&self, s: &SocialActivity, rule: &KolRule) -> Option<LabelResult> {
        if s.followers < rule.min_followers || s.mentions < rule.min_mentions || !s.verified {
            return None;
        }
        let confidence = (saturating(s.followers, 100_000.0) + saturating(s.mentions, 1_000.0)) / 2.0;
        Some(LabelResult::new(LabelName::Kol, self.ctx.confidence.clamp(confidence)))
    }

    fn community_leader(&self, s: &SocialActivity, rule: &CommunityLeaderRule) -> Option<LabelResult> {
        if s.community_messages < rule.min_messages || s.mentions < rule.min_mentions {
            return None;
        }
        let confidence = (saturating(s.community_messages, 500.0) + saturating(s.mentions, 100.0)) / 2.0;
        Some(LabelResult::new(LabelName::CommunityLeader, self.ctx.confidence.clamp(confidence)))
    }

    fn copy_target(&self, p: &EntityProfile, s: &SocialActivity, rule: &CopyTargetRule) -> Option<LabelResult> {
        if p.win_rate < rule.min_win_rate || p.total_volume < rule.min_total_volume || p.total_trades < rule.min_trades {
            return None;
        }
        if !s.has_presence() && p.win_rate < STANDALONE_COPY_WIN_RATE {
            return None;
        }
        let confidence = (p.win_rate + (p.total_volume / 1_000_000.0).min(1.0)) / 2.0;
        Some(LabelResult::new(LabelName::CopyTarget, self.ctx.confidence.clamp(confidence)))
    }

    fn silent_whale(&self, p: &EntityProfile, s: &SocialActivity, rule: &SilentWhaleRule) -> Option<LabelResult> {
        if p.total_volume < rule.min_total_volume || p.win_rate < rule.min_win_rate {
            return None;
        }
        if s.followers >= rule.max_followers || s.mentions >= rule.max_mentions {
            return None;
        }
        let confidence = (p.total_volume / 5_000_000.0).min(1.0);
        Some(LabelResult::new(LabelName::SilentWhale, self.ctx.confidence.clamp(confidence)))
    }
}

#[async_trait]
impl Tagger for SocialTagger {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn evaluate(&self, profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
        let rules = &self.rules;
        let kol = active(&rules.kol);
        let leader = active(&rules.community_leader);
        let copy = active(&rules.copy_target);
        let whale = active(&rules.silent_whale);
        if kol.is_none() && leader.is_none() && copy.is_none() && whale.is_none() {
            return Ok(Vec::new());
        }

        let social = settle(
            "social_activity",
            profile.id,
            self.ctx.capabilities.social_activity(&profile.address).await,
        )
        .unwrap_or(SocialActivity::NEUTRAL);

        let mut labels = Vec::new();
        labels.extend(kol.and_then(|r| self.kol(&social, r)));
        labels.extend(leader.and_then(|r| self.community_leader(&social, r)));
        labels.extend(copy.and_then(|r| self.copy_target(profile, &social, r)));
        labels.extend(whale.and_then(|r| self.silent_whale(profile, &social, r)));
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::fixture::FixtureCapabilities;
    use crate::store::memory::InMemoryStore;
    use crate::taggers::testing::*;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000a1";

    fn rules() -> SocialRules {
        SocialRules {
            kol: Some(KolRule {
                enabled: true,
                min_followers: 10_000,
                min_mentions: 100,
            }),
            community_leader: Some(CommunityLeaderRule {
                enabled: true,
                min_messages: 100,
                min_mentions: 20,
            }),
            copy_target: Some(CopyTargetRule {
                enabled: true,
                min_win_rate: 0.7,
                min_total_volume: 100_000.0,
                min_trades: 20,
            }),
            silent_whale: Some(SilentWhaleRule {
                enabled: true,
                min_total_volume: 1_000_000.0,
                min_win_rate: 0.65,
                max_followers: 100,
                max_mentions: 10,
            }),
        }
    }

    fn whale() -> EntityProfile {
        let mut p = profile(400, 0.72);
        p.total_volume = 2_500_000.0;
        p
    }

    #[tokio::test]
    async fn test_without_social_source_whale_is_silent() {
        let tagger = SocialTagger::new(unwired(InMemoryStore::new()), rules());
        let labels = tagger.evaluate(&whale(), as_of()).await.unwrap();
        let names: Vec<LabelName> = labels.iter().map(|l| l.name).collect();
        // 0.72 is under the standalone copy-target bar, so only the whale fires
        assert_eq!(names, vec![LabelName::SilentWhale]);
        assert!(approx(labels[0].confidence, 0.5));
    }

    #[tokio::test]
    async fn test_influencer_labels() {
        let social = SocialActivity {
            followers: 50_000,
            mentions: 500,
            community_messages: 250,
            verified: true,
        };
        let caps = FixtureCapabilities::new().with_social(ADDRESS, social);
        let tagger = SocialTagger::new(context(InMemoryStore::new(), caps), rules());
        let labels = tagger.evaluate(&whale(), as_of()).await.unwrap();
        let names: Vec<LabelName> = labels.iter().map(|l| l.name).collect();
        assert_eq!(names, vec![LabelName::Kol, LabelName::CommunityLeader, LabelName::CopyTarget]);
        assert!(approx(labels[0].confidence, 0.5));
        assert!(approx(labels[1].confidence, 0.75));
        assert!(approx(labels[2].confidence, (0.72 + 1.0) / 2.0));
    }

    #[tokio::test]
    async fn test_failed_lookup_is_neutral() {
        let caps = FixtureCapabilities::new().failing("social_activity");
        let tagger = SocialTagger::new(context(InMemoryStore::new(), caps), rules());
        let labels = tagger.evaluate(&whale(), as_of()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, LabelName::SilentWhale);
    }
}
