//! Mapping session: stage posed images, build a map, hand it back.
//!
//! Building the point cloud is the job of the external [`MapBuilder`]. The
//! session only stages inputs and stores the prepared map in the `VPSMAP`
//! format so it can be loaded into a registry later.

use std::path::Path;
use std::sync::Arc;

use nalgebra::Vector3;

use crate::atlas::MapData;
use crate::error::{VpsError, VpsResult};
use crate::geometry::SE3;
use crate::io::map_file::encode_map;
use crate::localization::{CameraIntrinsics, Image, ImageView};
use crate::system::validation::UserValidation;

/// An image queued for map building.
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub image: Image,
    pub intrinsics: CameraIntrinsics,
    /// Camera-to-world pose at capture time.
    pub pose: SE3,
}

/// External map building pipeline.
pub trait MapBuilder: Send + Sync {
    fn build(&self, images: &[StagedImage]) -> anyhow::Result<MapData>;
}

pub struct MappingSession {
    builder: Box<dyn MapBuilder>,
    validation: Arc<UserValidation>,
    images: Vec<StagedImage>,
    prepared: Option<MapData>,
}

impl MappingSession {
    pub fn new(builder: Box<dyn MapBuilder>, validation: Arc<UserValidation>) -> Self {
        Self {
            builder,
            validation,
            images: Vec::new(),
            prepared: None,
        }
    }

    /// Stage an image. Returns the number of staged images.
    pub fn add_image(
        &mut self,
        image: &ImageView<'_>,
        intrinsics: CameraIntrinsics,
        pose: SE3,
    ) -> VpsResult<usize> {
        let image = ImageView::new(image.width, image.height, image.channels, image.data)?;
        intrinsics.validate()?;
        if !pose.is_orthonormal(1e-6) {
            return Err(VpsError::InvalidInput("camera pose rotation is not orthonormal".into()));
        }
        self.images.push(StagedImage {
            image: image.to_image(),
            intrinsics,
            pose,
        });
        Ok(self.images.len())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Build the map from the staged images and write it to `path`.
    ///
    /// Returns the number of points in the prepared map.
    pub fn prepare(&mut self, path: &Path) -> VpsResult<usize> {
        self.validation.require()?;
        if self.images.is_empty() {
            return Err(VpsError::InvalidInput("no images staged".into()));
        }

        let data = self
            .builder
            .build(&self.images)
            .map_err(|e| VpsError::map_load(path.display().to_string(), format!("{e:#}")))?;
        std::fs::write(path, encode_map(&data))?;

        let n = data.points.len();
        tracing::info!(
            "Prepared map {} from {} images ({} points)",
            path.display(),
            self.images.len(),
            n
        );
        self.prepared = Some(data);
        Ok(n)
    }

    /// Encoded prepared map.
    pub fn map_bytes(&self) -> VpsResult<Vec<u8>> {
        self.prepared
            .as_ref()
            .map(encode_map)
            .ok_or_else(|| VpsError::InvalidInput("no prepared map".into()))
    }

    pub fn point_count(&self) -> usize {
        self.prepared.as_ref().map_or(0, |m| m.points.len())
    }

    pub fn points(&self, max_count: usize) -> &[Vector3<f32>] {
        match &self.prepared {
            Some(m) => &m.points[..m.points.len().min(max_count)],
            None => &[],
        }
    }

    /// Discard staged images and the prepared map.
    pub fn free_resources(&mut self) {
        let n = self.images.len();
        self.images.clear();
        self.prepared = None;
        tracing::debug!("Mapping session released {} staged images", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MapToEcef;
    use crate::io::map_file::decode_map;
    use crate::system::validation::StaticTokenAuthority;
    use tempfile::tempdir;

    /// Builder emitting one point per staged camera position.
    struct CameraCentersBuilder;

    impl MapBuilder for CameraCentersBuilder {
        fn build(&self, images: &[StagedImage]) -> anyhow::Result<MapData> {
            Ok(MapData {
                points: images
                    .iter()
                    .map(|s| s.pose.translation.cast::<f32>())
                    .collect(),
                map_to_ecef: MapToEcef::identity(),
            })
        }
    }

    struct FailingBuilder;

    impl MapBuilder for FailingBuilder {
        fn build(&self, _images: &[StagedImage]) -> anyhow::Result<MapData> {
            anyhow::bail!("not enough overlap")
        }
    }

    fn session(builder: Box<dyn MapBuilder>) -> MappingSession {
        let v = UserValidation::new(Box::new(StaticTokenAuthority::new(["ok"])));
        v.validate_user("ok");
        MappingSession::new(builder, Arc::new(v))
    }

    fn add_posed(session: &mut MappingSession, x: f64) -> usize {
        let pixels = [0u8; 4];
        let image = ImageView::new(2, 2, 1, &pixels).unwrap();
        let k = CameraIntrinsics::new(100.0, 100.0, 1.0, 1.0).unwrap();
        let mut pose = SE3::identity();
        pose.translation = Vector3::new(x, 0.0, 0.0);
        session.add_image(&image, k, pose).unwrap()
    }

    #[test]
    fn test_stage_and_prepare() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.vpsmap");
        let mut s = session(Box::new(CameraCentersBuilder));

        assert_eq!(add_posed(&mut s, 1.0), 1);
        assert_eq!(add_posed(&mut s, 2.0), 2);
        assert_eq!(add_posed(&mut s, 3.0), 3);
        assert_eq!(s.image_count(), 3);

        assert_eq!(s.prepare(&path).unwrap(), 3);
        assert_eq!(s.point_count(), 3);
        assert_eq!(s.points(2), &[Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)]);

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, s.map_bytes().unwrap());
        assert_eq!(decode_map(&on_disk).unwrap().points.len(), 3);

        s.free_resources();
        assert_eq!(s.image_count(), 0);
        assert_eq!(s.point_count(), 0);
        assert!(s.map_bytes().is_err());
    }

    #[test]
    fn test_prepare_without_images() {
        let dir = tempdir().unwrap();
        let mut s = session(Box::new(CameraCentersBuilder));
        assert!(matches!(
            s.prepare(&dir.path().join("x.vpsmap")),
            Err(VpsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_builder_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.vpsmap");
        let mut s = session(Box::new(FailingBuilder));
        add_posed(&mut s, 0.0);
        assert!(matches!(s.prepare(&path), Err(VpsError::MapLoad { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_bad_image() {
        let mut s = session(Box::new(CameraCentersBuilder));
        let pixels = [0u8; 3];
        let image = ImageView {
            width: 2,
            height: 2,
            channels: 1,
            data: &pixels,
        };
        let k = CameraIntrinsics::new(100.0, 100.0, 1.0, 1.0).unwrap();
        assert!(s.add_image(&image, k, SE3::identity()).is_err());
        assert_eq!(s.image_count(), 0);
    }
}
