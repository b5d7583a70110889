use anyhow::Result;
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::net::UdpSocket;

use super::{Pose3D, PoseSink};

/// 関節1点ぶんのアドレス。引数: index, x, y, z
pub const POINT_ADDR: &str = "/pose/point";

/// 39点を1つのバンドルにまとめる（受信側で同一ラウンドとして扱える）
pub fn build_pose_bundle(pose: &Pose3D) -> OscPacket {
    let content = pose
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            OscPacket::Message(OscMessage {
                addr: POINT_ADDR.to_string(),
                args: vec![
                    OscType::Int(i as i32),
                    OscType::Float(p[0]),
                    OscType::Float(p[1]),
                    OscType::Float(p[2]),
                ],
            })
        })
        .collect();

    OscPacket::Bundle(OscBundle {
        // 即時
        timetag: OscTime { seconds: 0, fractional: 1 },
        content,
    })
}

/// OSC over UDP の送信クライアント
pub struct OscPoseSink {
    socket: UdpSocket,
    target_addr: String,
}

impl OscPoseSink {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }
}

impl PoseSink for OscPoseSink {
    fn emit(&mut self, pose: &Pose3D) -> Result<()> {
        let data = encoder::encode(&build_pose_bundle(pose))?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}
