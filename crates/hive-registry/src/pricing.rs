//! Monthly price of a specification and the payment an update owes.

use hive_core::config::PriceConfig;
use hive_core::types::{AppSpecification, Resources};

/// Smallest price any specification can cost.
pub const MIN_PRICE: f64 = 1.0;

/// Satoshis per coin.
pub const SATS_PER_COIN: f64 = 100_000_000.0;

fn resource_cost(resources: &Resources, price: &PriceConfig) -> f64 {
    resources.cpu * price.cpu * 10.0
        + resources.ram as f64 * price.ram / 100.0
        + resources.hdd as f64 * price.hdd
}

/// Round up to two decimals, ignoring float noise below 1e-6.
fn ceil_cents(value: f64) -> f64 {
    (value * 100.0 - 1e-6).ceil() / 100.0
}

/// Price per month of running a specification.
///
/// Tiered specifications cost the average of their three tier footprints.
pub fn price_per_month(spec: &AppSpecification, price: &PriceConfig) -> f64 {
    let raw = match (spec.tiered, &spec.tiers) {
        (true, Some(tiers)) => {
            (resource_cost(&tiers.basic, price)
                + resource_cost(&tiers.super_, price)
                + resource_cost(&tiers.bamf, price))
                / 3.0
        }
        _ => resource_cost(&spec.resources(), price),
    };
    ceil_cents(raw).max(MIN_PRICE)
}

/// Price an update owes, crediting the unused part of the previous
/// specification's lifetime.
///
/// `previous` is `(previous_price, previous_height)`. The credit is the
/// remaining fraction of `blocks_lasting` times the previous price,
/// clamped to `[0, previous_price]`.
pub fn required_payment(
    new_price: f64,
    previous: Option<(f64, u64)>,
    height: u64,
    blocks_lasting: u64,
) -> f64 {
    let Some((previous_price, previous_height)) = previous else {
        return new_price;
    };
    if blocks_lasting == 0 {
        return new_price;
    }
    let elapsed = height.saturating_sub(previous_height) as f64;
    let remaining = (blocks_lasting as f64 - elapsed) / blocks_lasting as f64;
    let credit = (remaining * previous_price).clamp(0.0, previous_price);
    ceil_cents(new_price - credit).max(MIN_PRICE)
}

/// Price in coins expressed in satoshis.
pub fn to_sats(price: f64) -> u64 {
    (price * SATS_PER_COIN).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::types::{SPEC_VERSION, TieredResources};

    fn spec(cpu: f64, ram: u64, hdd: u64) -> AppSpecification {
        AppSpecification {
            version: SPEC_VERSION,
            name: "demoapp".to_string(),
            description: String::new(),
            repotag: "acme/demo:latest".to_string(),
            owner: String::new(),
            port: 31000,
            container_port: 80,
            container_data: "/data".to_string(),
            environment_parameters: vec![],
            commands: vec![],
            cpu,
            ram,
            hdd,
            tiered: false,
            tiers: None,
        }
    }

    #[test]
    fn demo_app_price() {
        let price = PriceConfig::default();
        // 0.5 * 3 * 10 + 500 / 100 + 5 * 0.5
        assert_eq!(price_per_month(&spec(0.5, 500, 5), &price), 22.5);
    }

    #[test]
    fn price_has_floor() {
        let price = PriceConfig::default();
        assert_eq!(price_per_month(&spec(0.0, 0, 0), &price), MIN_PRICE);
        assert_eq!(price_per_month(&spec(0.0, 0, 1), &price), MIN_PRICE);
    }

    #[test]
    fn price_rounds_up_to_cents() {
        let price = PriceConfig {
            cpu: 0.0,
            ram: 0.0,
            hdd: 1.001,
        };
        assert_eq!(price_per_month(&spec(0.0, 0, 3), &price), 3.01);
        // Float noise does not bump an exact value.
        assert_eq!(price_per_month(&spec(0.3, 0, 0), &PriceConfig::default()), 9.0);
    }

    #[test]
    fn tiered_price_is_average() {
        let mut s = spec(0.0, 0, 0);
        s.tiered = true;
        s.tiers = Some(TieredResources {
            basic: Resources { cpu: 0.5, ram: 500, hdd: 5 },
            super_: Resources { cpu: 1.0, ram: 1000, hdd: 10 },
            bamf: Resources { cpu: 1.5, ram: 1500, hdd: 15 },
        });
        // (22.5 + 45 + 67.5) / 3
        assert_eq!(price_per_month(&s, &PriceConfig::default()), 45.0);
    }

    #[test]
    fn price_is_monotonic_per_resource() {
        let price = PriceConfig::default();
        let mut last = 0.0;
        for tenths in 0..40 {
            let p = price_per_month(&spec(tenths as f64 / 10.0, 500, 5), &price);
            assert!(p >= last);
            last = p;
        }
        let mut last = 0.0;
        for ram in (0..5000).step_by(100) {
            let p = price_per_month(&spec(0.5, ram, 5), &price);
            assert!(p >= last);
            last = p;
        }
        let mut last = 0.0;
        for hdd in 0..100 {
            let p = price_per_month(&spec(0.5, 500, hdd), &price);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn registration_pays_full_price() {
        assert_eq!(required_payment(22.5, None, 1000, 22_000), 22.5);
    }

    #[test]
    fn update_credits_remaining_lifetime() {
        // Half the lifetime left on a 20.0 spec → 10.0 credit.
        assert_eq!(required_payment(30.0, Some((20.0, 1000)), 12_000, 22_000), 20.0);
    }

    #[test]
    fn update_credit_is_clamped() {
        // Previous spec long expired: no negative credit.
        assert_eq!(required_payment(30.0, Some((20.0, 0)), 50_000, 22_000), 30.0);
        // Same block: full credit, but never below the floor.
        assert_eq!(required_payment(10.0, Some((20.0, 1000)), 1000, 22_000), MIN_PRICE);
    }

    #[test]
    fn sats_conversion() {
        assert_eq!(to_sats(22.5), 2_250_000_000);
        assert_eq!(to_sats(0.01), 1_000_000);
    }
}
