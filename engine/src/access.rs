//
// Copyright 2026 the Mudnet Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Site-based access control.
//!
//! Rules pair a subnet with a class and are consulted once per accept,
//! before any session state exists. Forbid beats permit whenever both
//! match an address.

use crate::error::{EngineError, EngineResult};
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// An IPv4 or IPv6 subnet in CIDR terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    base: IpAddr,
    prefix: u8,
}

/// How two subnets relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetOrder {
    /// Entirely before the other.
    Less,
    /// Entirely after the other.
    Greater,
    /// Strictly contains the other.
    Contains,
    /// Same base and prefix.
    Equal,
    /// Strictly inside the other.
    ContainedBy,
}

fn addr_bits(addr: IpAddr) -> (u128, u8) {
    match addr {
        IpAddr::V4(v4) => (u32::from(v4) as u128, 32),
        IpAddr::V6(v6) => (u128::from(v6), 128),
    }
}

fn bits_to_addr(bits: u128, v4: bool) -> IpAddr {
    if v4 {
        IpAddr::V4(Ipv4Addr::from(bits as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(bits))
    }
}

impl Subnet {
    /// Build a subnet, clearing any host bits below the prefix.
    ///
    /// Host bits set in `base` are corrected, not rejected; a rule written
    /// as `10.0.0.5/8` means `10.0.0.0/8`.
    pub fn new(base: IpAddr, prefix: u8) -> EngineResult<Subnet> {
        let (bits, width) = addr_bits(base);
        if prefix > width {
            return Err(EngineError::InvalidSiteMask {
                spec: format!("{base}/{prefix}"),
                reason: format!("prefix exceeds {width} bits"),
            });
        }
        let mask = prefix_mask(prefix, width);
        let masked = bits & mask;
        if masked != bits {
            tracing::warn!(%base, prefix, "host bits outside mask ignored");
        }
        Ok(Subnet {
            base: bits_to_addr(masked, base.is_ipv4()),
            prefix,
        })
    }

    /// A single-host subnet.
    pub fn host(addr: IpAddr) -> Subnet {
        let (_, width) = addr_bits(addr);
        Subnet {
            base: addr,
            prefix: width,
        }
    }

    /// Parse `addr`, `addr/prefix`, or IPv4 `addr/dotted-mask`.
    pub fn parse(spec: &str) -> EngineResult<Subnet> {
        let invalid = |reason: &str| EngineError::InvalidSiteMask {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        match spec.split_once('/') {
            None => {
                let addr: IpAddr = spec.parse().map_err(|_| invalid("bad address"))?;
                Ok(Subnet::host(addr))
            }
            Some((addr, mask)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid("bad address"))?;
                if let Ok(prefix) = mask.parse::<u8>() {
                    return Subnet::new(addr, prefix);
                }
                // IPv4 dotted-mask notation.
                let mask_addr: Ipv4Addr =
                    mask.parse().map_err(|_| invalid("bad prefix or mask"))?;
                if !addr.is_ipv4() {
                    return Err(invalid("dotted mask with IPv6 address"));
                }
                let bits = u32::from(mask_addr);
                let prefix = bits.leading_ones();
                if bits != prefix_mask(prefix as u8, 32) as u32 {
                    return Err(invalid("non-contiguous mask"));
                }
                Subnet::new(addr, prefix as u8)
            }
        }
    }

    /// First address of the range.
    pub fn base(&self) -> IpAddr {
        self.base
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn range(&self) -> (u128, u128) {
        let (bits, width) = addr_bits(self.base);
        let mask = prefix_mask(self.prefix, width);
        (bits, bits | !mask & prefix_mask(width, width))
    }

    /// Order this subnet against another by range.
    ///
    /// Subnets of different address families never overlap; IPv4 sorts
    /// before IPv6.
    pub fn compare(&self, other: &Subnet) -> SubnetOrder {
        match (self.base.is_ipv4(), other.base.is_ipv4()) {
            (true, false) => return SubnetOrder::Less,
            (false, true) => return SubnetOrder::Greater,
            _ => {}
        }
        let (a_start, a_end) = self.range();
        let (b_start, b_end) = other.range();
        match (a_start.cmp(&b_start), a_end.cmp(&b_end)) {
            (Ordering::Equal, Ordering::Equal) => SubnetOrder::Equal,
            (Ordering::Less | Ordering::Equal, Ordering::Greater | Ordering::Equal) => {
                SubnetOrder::Contains
            }
            (Ordering::Greater | Ordering::Equal, Ordering::Less | Ordering::Equal) => {
                SubnetOrder::ContainedBy
            }
            (Ordering::Less, _) => SubnetOrder::Less,
            (Ordering::Greater, _) => SubnetOrder::Greater,
        }
    }

    /// Whether an address falls inside this subnet.
    pub fn contains_addr(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.base.is_ipv4() {
            return false;
        }
        let (bits, _) = addr_bits(addr);
        let (start, end) = self.range();
        (start..=end).contains(&bits)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

fn prefix_mask(prefix: u8, width: u8) -> u128 {
    let full = if width == 128 { u128::MAX } else { (1u128 << width) - 1 };
    match prefix {
        0 => 0,
        p if p >= width => full,
        p => full & !(full >> p),
    }
}

/// What a rule does to matching addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClass {
    /// Explicitly allowed.
    Permit,
    /// Refused at accept time.
    Forbid,
    /// Allowed but flagged for extra logging.
    Suspect,
    /// Allowed for guest logins only.
    Guest,
    /// Allowed with connection events reported to monitors.
    Monitor,
}

/// One access-control rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRule {
    /// Addresses the rule covers.
    pub subnet: Subnet,
    /// What to do with them.
    pub class: SiteClass,
}

/// Classification of one peer address against the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteAccess {
    /// Refused outright.
    pub forbidden: bool,
    /// Flagged for extra logging.
    pub suspect: bool,
    /// Restricted to guest logins.
    pub guest_only: bool,
    /// Connection events reported to monitors.
    pub monitored: bool,
}

/// The configured rule list.
#[derive(Debug, Clone, Default)]
pub struct SiteRules {
    rules: Vec<SiteRule>,
}

impl SiteRules {
    /// An empty rule set allowing everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one rule.
    pub fn push(&mut self, subnet: Subnet, class: SiteClass) {
        self.rules.push(SiteRule { subnet, class });
    }

    /// Builder form of [`SiteRules::push`].
    pub fn with_rule(mut self, subnet: Subnet, class: SiteClass) -> Self {
        self.push(subnet, class);
        self
    }

    /// The rules in configuration order.
    pub fn rules(&self) -> &[SiteRule] {
        &self.rules
    }

    /// Classify a peer address. Forbid wins over permit whenever both
    /// match.
    pub fn classify(&self, addr: IpAddr) -> SiteAccess {
        let mut access = SiteAccess::default();
        for rule in &self.rules {
            if !rule.subnet.contains_addr(addr) {
                continue;
            }
            match rule.class {
                SiteClass::Permit => {}
                SiteClass::Forbid => access.forbidden = true,
                SiteClass::Suspect => access.suspect = true,
                SiteClass::Guest => access.guest_only = true,
                SiteClass::Monitor => access.monitored = true,
            }
        }
        access
    }

    /// Whether an address is refused at accept time.
    pub fn is_forbidden(&self, addr: IpAddr) -> bool {
        self.classify(addr).forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_bare_address_as_host() {
        let net = Subnet::parse("10.1.2.3").unwrap();
        assert_eq!(net.prefix(), 32);
        assert!(net.contains_addr(v4("10.1.2.3")));
        assert!(!net.contains_addr(v4("10.1.2.4")));
    }

    #[test]
    fn parses_cidr_and_dotted_mask_alike() {
        let cidr = Subnet::parse("192.168.0.0/24").unwrap();
        let dotted = Subnet::parse("192.168.0.0/255.255.255.0").unwrap();
        assert_eq!(cidr, dotted);
    }

    #[test]
    fn rejects_non_contiguous_mask() {
        assert!(matches!(
            Subnet::parse("10.0.0.0/255.0.255.0"),
            Err(EngineError::InvalidSiteMask { .. })
        ));
    }

    #[test]
    fn corrects_host_bits() {
        let net = Subnet::parse("10.0.0.5/8").unwrap();
        assert_eq!(net.base(), v4("10.0.0.0"));
        assert!(net.contains_addr(v4("10.255.255.255")));
    }

    #[test]
    fn compare_orders_ranges() {
        let a = Subnet::parse("10.0.0.0/8").unwrap();
        let b = Subnet::parse("10.1.0.0/16").unwrap();
        let c = Subnet::parse("11.0.0.0/8").unwrap();
        assert_eq!(a.compare(&b), SubnetOrder::Contains);
        assert_eq!(b.compare(&a), SubnetOrder::ContainedBy);
        assert_eq!(a.compare(&c), SubnetOrder::Less);
        assert_eq!(c.compare(&a), SubnetOrder::Greater);
        assert_eq!(a.compare(&a), SubnetOrder::Equal);
    }

    #[test]
    fn ipv6_subnets_work() {
        let net = Subnet::parse("2001:db8::/32").unwrap();
        assert!(net.contains_addr("2001:db8::1".parse().unwrap()));
        assert!(!net.contains_addr("2001:db9::1".parse().unwrap()));
        assert!(!net.contains_addr(v4("10.0.0.1")));
    }

    #[test]
    fn families_never_overlap() {
        let v4net = Subnet::parse("0.0.0.0/0").unwrap();
        let v6net = Subnet::parse("::/0").unwrap();
        assert_eq!(v4net.compare(&v6net), SubnetOrder::Less);
        assert_eq!(v6net.compare(&v4net), SubnetOrder::Greater);
    }

    #[test]
    fn forbid_overrides_permit() {
        let rules = SiteRules::new()
            .with_rule(Subnet::parse("10.0.0.0/8").unwrap(), SiteClass::Permit)
            .with_rule(Subnet::parse("10.6.0.0/16").unwrap(), SiteClass::Forbid);
        assert!(!rules.is_forbidden(v4("10.1.1.1")));
        assert!(rules.is_forbidden(v4("10.6.1.1")));
    }

    #[test]
    fn classes_accumulate() {
        let rules = SiteRules::new()
            .with_rule(Subnet::parse("10.0.0.0/8").unwrap(), SiteClass::Suspect)
            .with_rule(Subnet::parse("10.6.0.0/16").unwrap(), SiteClass::Guest);
        let access = rules.classify(v4("10.6.1.1"));
        assert!(access.suspect && access.guest_only && !access.forbidden);
    }

    proptest::proptest! {
        /// Host-bit correction never excludes the address a rule was
        /// written against.
        #[test]
        fn subnet_contains_the_address_it_was_built_from(
            bits in proptest::num::u32::ANY,
            prefix in 0u8..=32,
        ) {
            let addr = IpAddr::V4(Ipv4Addr::from(bits));
            let net = Subnet::new(addr, prefix).unwrap();
            proptest::prop_assert!(net.contains_addr(addr));
        }

        /// `compare` is antisymmetric over arbitrary v4 subnet pairs.
        #[test]
        fn compare_is_antisymmetric(
            a in proptest::num::u32::ANY,
            ap in 0u8..=32,
            b in proptest::num::u32::ANY,
            bp in 0u8..=32,
        ) {
            let x = Subnet::new(IpAddr::V4(Ipv4Addr::from(a)), ap).unwrap();
            let y = Subnet::new(IpAddr::V4(Ipv4Addr::from(b)), bp).unwrap();
            let expect = match x.compare(&y) {
                SubnetOrder::Less => SubnetOrder::Greater,
                SubnetOrder::Greater => SubnetOrder::Less,
                SubnetOrder::Contains => SubnetOrder::ContainedBy,
                SubnetOrder::ContainedBy => SubnetOrder::Contains,
                SubnetOrder::Equal => SubnetOrder::Equal,
            };
            proptest::prop_assert_eq!(y.compare(&x), expect);
        }
    }
}
