//! Signal fusion: scoring optional inputs into `(bias, strength, confidence)`.
//!
//! The fuser is total and deterministic: it accepts any subset of inputs,
//! never fails, and produces bit-identical output for identical input.
//! Contributions are added independently to a bullish and a bearish score;
//! the prevailing side wins with strength equal to its normalized margin.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use perp_common::records::{FedWatchData, WhaleAlert};
use perp_common::signal::{MacroSignal, MarketSignal};
use perp_common::types::{PositionSide, SignalBias};

/// Number of input kinds a market signal is scored against.
const MAX_MARKET_DATA_POINTS: usize = 5;

/// Number of input kinds a macro signal is scored against.
const MAX_MACRO_DATA_POINTS: usize = 4;

/// Funding rates beyond this magnitude are considered crowded.
const FUNDING_RATE_THRESHOLD: f64 = 0.0001;

/// Fused outcome of the scoring pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub bias: SignalBias,
    /// Normalized margin of the prevailing side, in [0, 1].
    pub strength: f64,
    /// Fraction of expected input kinds actually contributing, in [0, 1].
    pub confidence: f64,
}

impl Fusion {
    /// The neutral outcome: no bias, zero strength, zero confidence.
    pub fn neutral() -> Self {
        Self {
            bias: SignalBias::Neutral,
            strength: 0.0,
            confidence: 0.0,
        }
    }
}

/// Score a market signal's inputs.
///
/// | input                                  | contribution              |
/// |----------------------------------------|---------------------------|
/// | funding rate > +0.0001                 | bearish += 0.3            |
/// | funding rate < -0.0001                 | bullish += 0.3            |
/// | long/short ratio > 1.5                 | bearish += 0.2            |
/// | long/short ratio < 0.7                 | bullish += 0.2            |
/// | whale inflow > 1.5x outflow            | bearish += 0.3            |
/// | whale outflow > 1.5x inflow            | bullish += 0.3            |
/// | long liquidations > 2x short           | bearish += 0.2            |
/// | short liquidations > 2x long           | bullish += 0.2            |
/// | sentiment score > +0.2                 | bullish += 0.25 * score   |
/// | sentiment score < -0.2                 | bearish += 0.25 * |score| |
/// | fed cut probability > 0.5              | bullish += 0.3 * prob     |
/// | fed hike probability > 0.3             | bearish += 0.3 * prob     |
pub fn fuse(signal: &MarketSignal) -> Fusion {
    let mut bullish = 0.0_f64;
    let mut bearish = 0.0_f64;
    let mut data_points = 0_usize;

    // Funding rate: a crowded side pays, and crowded trades unwind.
    if let Some(fr) = &signal.funding_rate {
        data_points += 1;
        if fr.rate > FUNDING_RATE_THRESHOLD {
            bearish += 0.3;
        } else if fr.rate < -FUNDING_RATE_THRESHOLD {
            bullish += 0.3;
        }
    }

    // Long/short positioning ratio.
    if let Some(lsr) = &signal.long_short_ratio {
        data_points += 1;
        if lsr.ratio > 1.5 {
            bearish += 0.2;
        } else if lsr.ratio < 0.7 {
            bullish += 0.2;
        }
    }

    // Whale flows: exchange inflows precede selling, outflows accumulation.
    if !signal.recent_whale_alerts.is_empty() {
        data_points += 1;
        let (inflow, outflow) = WhaleAlert::net_flows(&signal.recent_whale_alerts);
        if inflow > outflow * dec!(1.5) {
            bearish += 0.3;
        } else if outflow > inflow * dec!(1.5) {
            bullish += 0.3;
        }
    }

    // Liquidation cascades tend to continue in their direction.
    if !signal.recent_liquidations.is_empty() {
        data_points += 1;
        let mut long_value = Decimal::ZERO;
        let mut short_value = Decimal::ZERO;
        for liq in &signal.recent_liquidations {
            match liq.side {
                PositionSide::Long => long_value += liq.value_usd,
                PositionSide::Short => short_value += liq.value_usd,
            }
        }
        if long_value > short_value * dec!(2) {
            bearish += 0.2;
        } else if short_value > long_value * dec!(2) {
            bullish += 0.2;
        }
    }

    // Social sentiment, weighted by its own magnitude.
    if let Some(sentiment) = &signal.social_sentiment {
        data_points += 1;
        let score = sentiment.sentiment_score;
        if score > 0.2 {
            bullish += 0.25 * score;
        } else if score < -0.2 {
            bearish += 0.25 * (-score);
        }
    }

    // Fed rate expectations derived from the macro provider.
    if signal.fed_cut_prob.is_some() || signal.fed_hike_prob.is_some() {
        data_points += 1;
        if let Some(cut) = signal.fed_cut_prob {
            if cut > 0.5 {
                bullish += 0.3 * cut;
            }
        }
        if let Some(hike) = signal.fed_hike_prob {
            if hike > 0.3 {
                bearish += 0.3 * hike;
            }
        }
    }

    resolve(bullish, bearish, data_points, MAX_MARKET_DATA_POINTS)
}

/// Score a macro signal's inputs: FedWatch, CPI, GDP, unemployment.
pub fn analyze_macro(signal: &MacroSignal) -> Fusion {
    let mut bullish = 0.0_f64;
    let mut bearish = 0.0_f64;
    let mut data_points = 0_usize;

    // Rate cuts are bullish for risk assets, hikes bearish.
    if let Some(meeting) = signal.fed_watch.as_ref().and_then(|fw| fw.next_meeting.as_ref()) {
        data_points += 1;
        if meeting.cut_prob > 0.5 {
            bullish += 0.3 * meeting.cut_prob;
        }
        if meeting.hike_prob > 0.3 {
            bearish += 0.3 * meeting.hike_prob;
        }
    }

    // Inflation surprises move rate expectations.
    if let Some(cpi) = &signal.cpi {
        data_points += 1;
        if cpi.forecast > 0.0 {
            if cpi.value > cpi.forecast {
                bearish += 0.2;
            } else if cpi.value < cpi.forecast {
                bullish += 0.2;
            }
        }
    }

    if let Some(gdp) = &signal.gdp {
        data_points += 1;
        if gdp.value > gdp.previous {
            bullish += 0.15;
        } else if gdp.value < gdp.previous {
            bearish += 0.15;
        }
    }

    // Rising unemployment is a mixed signal: weak economy, but rate-cut fuel.
    if let Some(unemployment) = &signal.unemployment {
        data_points += 1;
        if unemployment.value > unemployment.previous {
            bullish += 0.1;
            bearish += 0.1;
        } else if unemployment.value < unemployment.previous {
            bullish += 0.1;
        }
    }

    resolve(bullish, bearish, data_points, MAX_MACRO_DATA_POINTS)
}

/// Tiered bias from Fed policy expectations alone.
pub fn fed_bias(fed_watch: &FedWatchData) -> (SignalBias, f64) {
    let Some(meeting) = &fed_watch.next_meeting else {
        return (SignalBias::Neutral, 0.0);
    };

    if meeting.cut_prob > 0.7 {
        return (SignalBias::Bullish, meeting.cut_prob);
    }
    if meeting.cut_prob > 0.5 {
        return (SignalBias::Bullish, meeting.cut_prob * 0.7);
    }
    if meeting.hike_prob > 0.5 {
        return (SignalBias::Bearish, meeting.hike_prob);
    }
    if meeting.hike_prob > 0.3 {
        return (SignalBias::Bearish, meeting.hike_prob * 0.7);
    }

    (SignalBias::Neutral, 0.0)
}

fn resolve(bullish: f64, bearish: f64, data_points: usize, max_points: usize) -> Fusion {
    let total = bullish + bearish;
    if total == 0.0 || data_points == 0 {
        return Fusion::neutral();
    }

    let (bias, strength) = if bullish > bearish {
        (SignalBias::Bullish, (bullish - bearish) / total)
    } else if bearish > bullish {
        (SignalBias::Bearish, (bearish - bullish) / total)
    } else {
        (SignalBias::Neutral, 0.0)
    };

    Fusion {
        bias,
        strength,
        confidence: (data_points as f64 / max_points as f64).min(1.0),
    }
}
