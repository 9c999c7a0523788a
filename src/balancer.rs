use crate::resolver::{DiscoveryInstance, DiscoveryResult};
use rand::Rng;

/// Picks the instance a request goes to.
pub trait LoadBalancer: Send + Sync {
    fn pick(&self, result: &DiscoveryResult) -> Option<DiscoveryInstance>;

    fn name(&self) -> &str;
}

/// Random pick, proportional to instance weight. Instances without weight are never picked.
#[derive(Debug, Default, Clone)]
pub struct WeightRandomBalancer;

impl LoadBalancer for WeightRandomBalancer {
    fn pick(&self, result: &DiscoveryResult) -> Option<DiscoveryInstance> {
        let weighted: Vec<&DiscoveryInstance> =
            result.instances.iter().filter(|i| i.weight > 0).collect();

        match weighted.len() {
            0 => None,
            1 => Some(weighted[0].clone()),
            _ => {
                let total: u64 = weighted.iter().map(|i| i.weight as u64).sum();
                let mut offset = rand::thread_rng().gen_range(0..total);
                for instance in weighted {
                    let weight = instance.weight as u64;
                    if offset < weight {
                        return Some(instance.clone());
                    }
                    offset -= weight;
                }
                None
            }
        }
    }

    fn name(&self) -> &str {
        "weight_random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NetAddr;
    use std::collections::HashMap;

    fn instance(addr: &str, weight: u32) -> DiscoveryInstance {
        DiscoveryInstance::new(NetAddr::new("tcp", addr), weight, HashMap::new())
    }

    #[test]
    fn skips_zero_weight() {
        let result = DiscoveryResult {
            cache_key: String::from("svc"),
            instances: vec![instance("10.0.0.1:80", 0), instance("10.0.0.2:80", 5)],
        };

        for _ in 0..20 {
            let picked = WeightRandomBalancer.pick(&result).unwrap();
            assert_eq!(picked.address.address(), "10.0.0.2:80");
        }
    }

    #[test]
    fn nothing_to_pick() {
        let result = DiscoveryResult {
            cache_key: String::from("svc"),
            instances: vec![instance("10.0.0.1:80", 0)],
        };
        assert!(WeightRandomBalancer.pick(&result).is_none());
        assert!(WeightRandomBalancer.pick(&DiscoveryResult::default()).is_none());
    }

    #[test]
    fn follows_weights() {
        let result = DiscoveryResult {
            cache_key: String::from("svc"),
            instances: vec![instance("10.0.0.1:80", 1), instance("10.0.0.2:80", 99)],
        };

        let heavy = (0..1000)
            .filter_map(|_| WeightRandomBalancer.pick(&result))
            .filter(|i| i.address.address() == "10.0.0.2:80")
            .count();
        assert!(heavy > 900, "heavy instance picked only {} times", heavy);
    }
}
