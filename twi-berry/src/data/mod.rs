use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::{NiftiHeader, NiftiObject, ReaderOptions};

use crate::{Idx3d, Point3};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait HeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取网格的空间几何信息 (形状 + 体素分辨率).
    #[inline]
    fn geom(&self) -> GridGeom {
        GridGeom::new(self.shape(), self.pix_dim())
    }
}

/// 体素网格的空间几何信息: 形状与体素分辨率.
///
/// 该结构只描述一个轴对齐的网格: 毫米坐标与体素索引之间按
/// `index = floor(coord / pix_dim)` 互相转换, 不包含旋转变换.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridGeom {
    shape: Idx3d,
    pix_dim: [f64; 3],
}

impl GridGeom {
    /// 初始化. `pix_dim` 的每个分量必须为正, 否则 panic.
    pub fn new(shape: Idx3d, pix_dim: [f64; 3]) -> Self {
        assert!(pix_dim.iter().all(|d| *d > 0.0), "体素分辨率必须为正");
        Self { shape, pix_dim }
    }

    /// 网格形状, 轴序 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素分辨率, 轴序 `[z, h, w]`, 毫米.
    #[inline]
    pub fn pix_dim(&self) -> [f64; 3] {
        self.pix_dim
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape;
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 将毫米空间点转换为体素索引. 点落在网格外时返回 `None`.
    pub fn locate(&self, p: Point3) -> Option<Idx3d> {
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            if p[axis] < 0.0 {
                return None;
            }
            idx[axis] = (p[axis] / self.pix_dim[axis]).floor() as usize;
        }
        let pos = (idx[0], idx[1], idx[2]);
        self.check(&pos).then_some(pos)
    }

    /// 体素 `idx` 的几何中心, 毫米空间.
    #[inline]
    pub fn center(&self, (z, h, w): Idx3d) -> Point3 {
        [
            (z as f64 + 0.5) * self.pix_dim[0],
            (h as f64 + 0.5) * self.pix_dim[1],
            (w as f64 + 0.5) * self.pix_dim[2],
        ]
    }
}

/// nii 格式 3D track-weighted image 网格, 包括 header 和体素数据.
/// 体素值以 `f32` 保存.
///
/// 网格的空间元信息从模板 nii 文件派生; 聚合引擎向其中写入结果,
/// 未被任何流线经过的体素保留调用者预填充的值.
#[derive(Debug, Clone)]
pub struct TwiGrid {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl HeaderAttr for TwiGrid {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for TwiGrid {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for TwiGrid {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl TwiGrid {
    /// 从 nii 模板文件派生输出网格. `path` 为 nii 文件的本地路径.
    /// 网格形状与体素分辨率取自模板 header, 体素数据以 0 填充.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn from_template<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());
        let data = Array3::zeros(get_shape_from_header(&header));
        Ok(Self { header, data })
    }

    /// 根据形状和体素分辨率直接创建网格实体, 体素数据以 0 填充.
    ///
    /// # 参数
    ///
    /// 1. `shape` 按照本 crate 惯用的 \[z, h, w\] 格式存储.
    /// 2. `pix_dim` 按照 \[z, h, w\] 格式存储, 以毫米为单位, 每个分量必须为正.
    ///
    /// # 注意
    ///
    /// 该方法创建的 header 只携带形状和分辨率信息, 因此你应仅将其用于
    /// 实验和测试目的.
    pub fn fake((z, h, w): Idx3d, pix_dim: [f32; 3]) -> Self {
        assert!(pix_dim.iter().all(|d| *d > 0.0), "体素分辨率必须为正");

        let mut header = Box::<NiftiHeader>::default();
        // nifti 惯用标准以 [W, H, z] 存储.
        header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
        let [pz, ph, pw] = pix_dim;
        header.pixdim = [1.0, pw, ph, pz, 1.0, 1.0, 1.0, 1.0];
        header.intent_name[..4].copy_from_slice(b"fake");

        let data = Array3::zeros((z, h, w));
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 将全部体素填充为 `value`.
    #[inline]
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 将网格写出为 nii 文件. header 元信息沿用构造时的模板.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        use nifti::writer::WriterOptions;

        // [z, H, W] -> [W, H, z]. 写出时恢复 nifti 惯用轴序.
        let out = self
            .data
            .view()
            .permuted_axes([2, 1, 0])
            .as_standard_layout()
            .to_owned();

        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::is_defined;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    /// 测试 fake 网格的元信息往返.
    #[test]
    fn test_fake_grid_attrs() {
        let g = TwiGrid::fake((4, 8, 16), [2.0, 1.0, 0.5]);
        assert!(g.is_faked());
        assert_eq!(g.shape(), (4, 8, 16));
        assert_eq!(g.size(), 4 * 8 * 16);
        let [pz, ph, pw] = g.pix_dim();
        assert!(f64_eq(pz, 2.0) && f64_eq(ph, 1.0) && f64_eq(pw, 0.5));
        assert!(f64_eq(g.voxel(), 1.0));

        assert!(g.check(&(3, 7, 15)));
        assert!(!g.check(&(4, 0, 0)));
    }

    /// 测试索引读写与填充.
    #[test]
    fn test_grid_index_fill() {
        let mut g = TwiGrid::fake((2, 2, 2), [1.0; 3]);
        assert!(is_defined(g[(0, 0, 0)]));
        g[(1, 1, 1)] = 3.5;
        assert_eq!(g[(1, 1, 1)], 3.5);
        g.fill(-1.0);
        assert_eq!(g[(1, 1, 1)], -1.0);
        assert_eq!(g[(0, 1, 0)], -1.0);
    }

    /// 测试毫米坐标与体素索引的互转.
    #[test]
    fn test_geom_locate_center() {
        let geom = GridGeom::new((4, 4, 4), [2.0, 1.0, 1.0]);

        assert_eq!(geom.locate([0.0, 0.0, 0.0]), Some((0, 0, 0)));
        assert_eq!(geom.locate([7.9, 3.9, 3.9]), Some((3, 3, 3)));
        assert_eq!(geom.locate([8.0, 0.0, 0.0]), None);
        assert_eq!(geom.locate([-0.1, 0.0, 0.0]), None);

        let c = geom.center((1, 2, 3));
        assert!(f64_eq(c[0], 3.0));
        assert!(f64_eq(c[1], 2.5));
        assert!(f64_eq(c[2], 3.5));
    }
}
