//! Fused signal records.
//!
//! `MarketSignal` is the per-symbol tagged union of optional inputs plus the
//! aggregated `(bias, strength, confidence)` triple. `MacroSignal` is the
//! analogous record scoped to macroeconomic inputs. The scoring that fills in
//! the aggregate fields lives in the engine crate; these records only carry
//! the data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{
    EconomicEvent, EconomicIndicator, FedWatchData, FundingRate, Liquidation, LongShortRatio,
    OpenInterest, SocialSentiment, WhaleAlert,
};
use crate::types::SignalBias;

/// Aggregated market signal for one symbol.
///
/// Every input is optional; the fuser handles any subset. Invariants:
/// `strength == 0.0` iff `bias == Neutral`; `strength` and `confidence` are
/// in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    // Derivatives data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<FundingRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<OpenInterest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_short_ratio: Option<LongShortRatio>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_liquidations: Vec<Liquidation>,

    // Whale activity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_whale_alerts: Vec<WhaleAlert>,

    // Social sentiment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_sentiment: Option<SocialSentiment>,

    // Macro-derived Fed probabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fed_cut_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fed_hike_prob: Option<f64>,

    // Aggregated output.
    pub bias: SignalBias,
    pub strength: f64,
    pub confidence: f64,
}

impl MarketSignal {
    /// An empty signal for `symbol` with no inputs and a neutral outcome.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            funding_rate: None,
            open_interest: None,
            long_short_ratio: None,
            recent_liquidations: Vec::new(),
            recent_whale_alerts: Vec::new(),
            social_sentiment: None,
            fed_cut_prob: None,
            fed_hike_prob: None,
            bias: SignalBias::Neutral,
            strength: 0.0,
            confidence: 0.0,
        }
    }
}

impl std::fmt::Display for MarketSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} signal: {} (strength {:.0}%, confidence {:.0}%)",
            self.symbol,
            self.bias,
            self.strength * 100.0,
            self.confidence * 100.0
        )?;
        if let Some(fr) = &self.funding_rate {
            write!(f, "\n  funding rate: {:.4}%", fr.rate * 100.0)?;
        }
        if let Some(lsr) = &self.long_short_ratio {
            write!(f, "\n  long/short ratio: {:.2}", lsr.ratio)?;
        }
        if !self.recent_whale_alerts.is_empty() {
            let (inflow, outflow) = WhaleAlert::net_flows(&self.recent_whale_alerts);
            write!(f, "\n  whale flows: ${} in / ${} out", inflow, outflow)?;
        }
        if let Some(s) = &self.social_sentiment {
            let label = if s.sentiment_score > 0.2 {
                "bullish"
            } else if s.sentiment_score < -0.2 {
                "bearish"
            } else {
                "neutral"
            };
            write!(
                f,
                "\n  sentiment: {} (score {:.2}, {} posts)",
                label, s.sentiment_score, s.social_volume
            )?;
        }
        if let (Some(cut), Some(hike)) = (self.fed_cut_prob, self.fed_hike_prob) {
            write!(f, "\n  fed: cut {:.0}% / hike {:.0}%", cut * 100.0, hike * 100.0)?;
        }
        Ok(())
    }
}

/// Aggregated macro signal, global (not per-symbol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSignal {
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fed_watch: Option<FedWatchData>,

    // Key economic indicators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpi: Option<EconomicIndicator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdp: Option<EconomicIndicator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unemployment: Option<EconomicIndicator>,
    /// The Fed's preferred inflation measure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pce: Option<EconomicIndicator>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upcoming_events: Vec<EconomicEvent>,

    pub bias: SignalBias,
    pub strength: f64,
    pub confidence: f64,
}

impl MacroSignal {
    /// An empty macro signal with no inputs and a neutral outcome.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            fed_watch: None,
            cpi: None,
            gdp: None,
            unemployment: None,
            pce: None,
            upcoming_events: Vec::new(),
            bias: SignalBias::Neutral,
            strength: 0.0,
            confidence: 0.0,
        }
    }

    /// Cut probability for the next FOMC meeting, if known.
    pub fn next_cut_prob(&self) -> Option<f64> {
        self.fed_watch
            .as_ref()
            .and_then(|fw| fw.next_meeting.as_ref())
            .map(|m| m.cut_prob)
    }

    /// Hike probability for the next FOMC meeting, if known.
    pub fn next_hike_prob(&self) -> Option<f64> {
        self.fed_watch
            .as_ref()
            .and_then(|fw| fw.next_meeting.as_ref())
            .map(|m| m.hike_prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_market_signal() {
        let s = MarketSignal::empty("BTC");
        assert_eq!(s.symbol, "BTC");
        assert_eq!(s.bias, SignalBias::Neutral);
        assert_eq!(s.strength, 0.0);
        assert_eq!(s.confidence, 0.0);
        assert!(s.recent_whale_alerts.is_empty());
    }

    #[test]
    fn test_market_signal_display_summary() {
        let mut s = MarketSignal::empty("ETH");
        s.bias = SignalBias::Bullish;
        s.strength = 0.6;
        s.confidence = 0.8;
        s.fed_cut_prob = Some(0.7);
        s.fed_hike_prob = Some(0.1);
        let text = format!("{}", s);
        assert!(text.contains("ETH signal: bullish"));
        assert!(text.contains("strength 60%"));
        assert!(text.contains("cut 70%"));
    }

    #[test]
    fn test_macro_signal_next_meeting_probs() {
        let mut m = MacroSignal::empty();
        assert!(m.next_cut_prob().is_none());

        m.fed_watch = Some(FedWatchData {
            current_rate: 5.25,
            next_meeting: Some(crate::records::FOMCMeeting {
                meeting_date: Utc::now(),
                current_rate: 5.25,
                most_likely_rate: 5.0,
                most_likely_prob: 0.7,
                rate_change_prob: 0.8,
                hike_prob: 0.1,
                cut_prob: 0.7,
                hold_prob: 0.2,
                timestamp: Utc::now(),
            }),
            upcoming_meetings: Vec::new(),
            timestamp: Utc::now(),
        });
        assert_eq!(m.next_cut_prob(), Some(0.7));
        assert_eq!(m.next_hike_prob(), Some(0.1));
    }

    #[test]
    fn test_market_signal_roundtrip() {
        let s = MarketSignal::empty("SOL");
        let json = serde_json::to_string(&s).unwrap();
        let parsed: MarketSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.symbol, "SOL");
        assert_eq!(parsed.bias, SignalBias::Neutral);
    }
}
