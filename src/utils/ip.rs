//! IP 地址处理工具
//!
//! 提供统一的客户端 IP 提取功能，支持：
//! - 可信代理配置（trusted_proxies）
//! - CIDR 匹配
//! - 私有 IP 自动检测

use std::net::{IpAddr, SocketAddr};

use actix_web::dev::ConnectionInfo;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

/// 检查 IP 是否在可信代理列表中
pub fn is_trusted_proxy(ip: &str, trusted_proxies: &[String]) -> bool {
    let ip_addr = if let Ok(socket_addr) = ip.parse::<SocketAddr>() {
        socket_addr.ip()
    } else if let Ok(ip_addr) = ip.parse::<IpAddr>() {
        ip_addr
    } else {
        return false;
    };

    trusted_proxies.iter().any(|proxy| {
        if proxy.contains('/') {
            ip_in_cidr(&ip_addr, proxy)
        } else {
            proxy.parse::<IpAddr>().is_ok_and(|p| p == ip_addr)
        }
    })
}

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_len): Result<u8, _> = prefix_len.parse() else {
        return false;
    };
    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix_len > 32 {
                return false;
            }
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            (u32::from_be_bytes(ip.octets()) & mask) == (u32::from_be_bytes(net.octets()) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix_len > 128 {
                return false;
            }
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            (u128::from_be_bytes(ip.octets()) & mask) == (u128::from_be_bytes(net.octets()) & mask)
        }
        _ => false,
    }
}

/// 从连接信息提取真实客户端 IP
///
/// 策略（按优先级）：
/// 1. 显式配置 trusted_proxies 且对端匹配 → 使用 X-Forwarded-For
/// 2. 显式配置但不匹配 → 使用连接 IP（防止伪造）
/// 3. 未配置且连接来自私有 IP → 视为反向代理，使用 X-Forwarded-For
/// 4. 默认 → 使用连接 IP
pub fn extract_client_ip(
    conn_info: &ConnectionInfo,
    headers: &HeaderMap,
    trusted_proxies: &[String],
) -> Option<String> {
    let peer = conn_info.peer_addr()?;

    if !trusted_proxies.is_empty() {
        if is_trusted_proxy(peer, trusted_proxies) {
            let real_ip = extract_forwarded_ip(headers).unwrap_or_else(|| peer.to_string());
            debug!("Trusted proxy {} -> {}", peer, real_ip);
            return Some(real_ip);
        }
        return Some(peer.to_string());
    }

    if let Ok(ip_addr) = peer.parse::<IpAddr>()
        && is_private_or_local(&ip_addr)
        && let Some(real_ip) = extract_forwarded_ip(headers)
    {
        debug!("Auto-detect proxy (private IP {}): {}", peer, real_ip);
        return Some(real_ip);
    }

    Some(peer.to_string())
}

/// 从请求头提取转发的 IP（X-Forwarded-For 首项，其次 X-Real-IP）
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        })
}
