//! Pure validation rules.
//!
//! Each rule inspects already-loaded values and returns the first problem
//! it finds. Rules that need storage lookups (uniqueness, parent loading)
//! live in the control plane's constraint engine, which calls into these.

use std::net::IpAddr;

use uuid::Uuid;

use crate::error::{ConstraintViolation, ValidationError};
use crate::models::domain::Domain;
use crate::models::security_group::{Protocol, SecurityGroupRule};

const MAX_NAME_LEN: usize = 255;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.into(),
        message: message.into(),
    }
}

/// Organization and space names: non-blank, bounded, and free of control
/// characters such as newline or escape. Any unicode letter is accepted.
pub fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.into(),
        });
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid(field, "must not contain control characters"));
    }
    Ok(())
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Domain names: dot-separated lower-case DNS labels, at least two of them.
pub fn validate_domain_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "domain.name".into(),
        });
    }
    if name.len() > MAX_DOMAIN_LEN {
        return Err(invalid(
            "domain.name",
            format!("must be at most {MAX_DOMAIN_LEN} characters"),
        ));
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| is_dns_label(l)) {
        return Err(invalid(
            "domain.name",
            "must be dot-separated labels of lower-case letters, digits and hyphens",
        ));
    }
    Ok(())
}

/// Route hosts: empty (bare domain), `*` (wildcard), or a single DNS label.
pub fn validate_route_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() || host == "*" || is_dns_label(host) {
        Ok(())
    } else {
        Err(invalid(
            "route.host",
            "must be a single label of lower-case letters, digits and hyphens",
        ))
    }
}

/// Route paths: empty, or starting with `/` and free of query/fragment parts.
pub fn validate_route_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Ok(());
    }
    if !path.starts_with('/') || path == "/" {
        return Err(invalid("route.path", "must start with '/' and not be '/'"));
    }
    if path.contains(['?', '#']) || path.chars().any(char::is_whitespace) {
        return Err(invalid(
            "route.path",
            "must not contain whitespace, '?' or '#'",
        ));
    }
    Ok(())
}

fn parse_port(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

fn valid_ports(ports: &str) -> bool {
    if let Some((start, end)) = ports.split_once('-') {
        return match (parse_port(start), parse_port(end)) {
            (Some(s), Some(e)) => s <= e,
            _ => false,
        };
    }
    ports.split(',').all(|p| parse_port(p).is_some())
}

fn valid_destination(destination: &str) -> bool {
    if let Some((addr, prefix)) = destination.split_once('/') {
        let Ok(ip) = addr.parse::<IpAddr>() else {
            return false;
        };
        let max = if ip.is_ipv4() { 32 } else { 128 };
        return prefix.parse::<u8>().is_ok_and(|p| p <= max);
    }
    if let Some((start, end)) = destination.split_once('-') {
        return match (start.parse::<IpAddr>(), end.parse::<IpAddr>()) {
            (Ok(IpAddr::V4(s)), Ok(IpAddr::V4(e))) => s <= e,
            (Ok(IpAddr::V6(s)), Ok(IpAddr::V6(e))) => s <= e,
            _ => false,
        };
    }
    destination.parse::<IpAddr>().is_ok()
}

fn valid_icmp_value(v: Option<i32>) -> bool {
    v.is_some_and(|v| (-1..=255).contains(&v))
}

/// Checks one security group rule. `index` is used to name the field.
pub fn validate_security_group_rule(
    index: usize,
    rule: &SecurityGroupRule,
) -> Result<(), ValidationError> {
    let field = format!("rules[{index}]");
    if !valid_destination(&rule.destination) {
        return Err(invalid(
            &field,
            "destination must be an IP address, CIDR block or address range",
        ));
    }
    match rule.protocol {
        Protocol::Tcp | Protocol::Udp => {
            let Some(ports) = rule.ports.as_deref() else {
                return Err(ValidationError::Required {
                    field: format!("{field}.ports"),
                });
            };
            if !valid_ports(ports) {
                return Err(invalid(
                    &field,
                    "ports must be a port, comma-separated ports, or a range",
                ));
            }
            if rule.icmp_type.is_some() || rule.icmp_code.is_some() {
                return Err(invalid(&field, "type and code are only valid for icmp"));
            }
        }
        Protocol::Icmp => {
            if !valid_icmp_value(rule.icmp_type) || !valid_icmp_value(rule.icmp_code) {
                return Err(invalid(
                    &field,
                    "icmp rules require type and code between -1 and 255",
                ));
            }
            if rule.ports.is_some() {
                return Err(invalid(&field, "ports are only valid for tcp and udp"));
            }
        }
        Protocol::All => {
            if rule.ports.is_some() || rule.icmp_type.is_some() || rule.icmp_code.is_some() {
                return Err(invalid(
                    &field,
                    "protocol 'all' takes no ports, type or code",
                ));
            }
        }
    }
    Ok(())
}

pub fn validate_security_group_rules(rules: &[SecurityGroupRule]) -> Result<(), ValidationError> {
    rules
        .iter()
        .enumerate()
        .try_for_each(|(i, rule)| validate_security_group_rule(i, rule))
}

/// An app and a service instance may only be bound inside one space.
pub fn check_binding_spaces(
    app_space_id: Uuid,
    service_instance_space_id: Uuid,
) -> Result<(), ConstraintViolation> {
    if app_space_id == service_instance_space_id {
        Ok(())
    } else {
        Err(ConstraintViolation::InvalidServiceBinding {
            app_space_id,
            service_instance_space_id,
        })
    }
}

/// Shared domains and domains already owned by `organization_id` pass;
/// private domains of any other organization are rejected.
pub fn check_domain_access(domain: &Domain, organization_id: Uuid) -> Result<(), ConstraintViolation> {
    if domain.usable_by(organization_id) {
        Ok(())
    } else {
        Err(ConstraintViolation::UnauthorizedAccessToPrivateDomain {
            domain_id: domain.id,
            organization_id,
        })
    }
}

/// Rejects only the transition from at least one manager to none.
pub fn check_manager_floor(
    organization_id: Uuid,
    current_managers: usize,
    proposed_managers: usize,
) -> Result<(), ConstraintViolation> {
    if current_managers > 0 && proposed_managers == 0 {
        Err(ConstraintViolation::LastManagerRemoval { organization_id })
    } else {
        Ok(())
    }
}

/// Memory quota check for starting or scaling an app.
///
/// `used_mb` is the organization's started memory excluding the app being
/// changed; `requested_mb` is that app's memory after the change.
pub fn check_memory_quota(
    organization_id: Uuid,
    memory_limit_mb: u64,
    instance_memory_limit_mb: Option<u64>,
    used_mb: u64,
    app_memory_mb: u64,
    app_instances: u32,
) -> Result<(), ConstraintViolation> {
    if let Some(cap) = instance_memory_limit_mb.filter(|cap| app_memory_mb > *cap) {
        return Err(ConstraintViolation::QuotaExceeded {
            organization_id,
            message: format!("instance memory {app_memory_mb}MB exceeds the {cap}MB limit"),
        });
    }
    let requested = app_memory_mb.saturating_mul(u64::from(app_instances));
    if used_mb.saturating_add(requested) > memory_limit_mb {
        return Err(ConstraintViolation::QuotaExceeded {
            organization_id,
            message: format!(
                "memory limit {memory_limit_mb}MB exceeded: {used_mb}MB in use, {requested}MB requested"
            ),
        });
    }
    Ok(())
}

/// Count limit check for services and routes.
pub fn check_count_quota(
    organization_id: Uuid,
    what: &str,
    limit: Option<u32>,
    current: u64,
) -> Result<(), ConstraintViolation> {
    match limit {
        Some(limit) if current >= u64::from(limit) => Err(ConstraintViolation::QuotaExceeded {
            organization_id,
            message: format!("total {what} limit of {limit} reached"),
        }),
        _ => Ok(()),
    }
}
