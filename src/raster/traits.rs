/// Read-only, row-oriented access to a single-band raster.
pub trait RasterView {
    type Cell: Copy;

    fn rows(&self) -> usize;
    fn cols(&self) -> usize;

    fn row(&self, r: usize) -> &[Self::Cell];

    fn row_iter(&self) -> Rows<'_, Self>
    where
        Self: Sized,
    {
        Rows { raster: self, r: 0 }
    }
}

pub struct Rows<'a, R: ?Sized + RasterView> {
    raster: &'a R,
    r: usize,
}

impl<'a, R: RasterView> Iterator for Rows<'a, R> {
    type Item = &'a [R::Cell];

    fn next(&mut self) -> Option<Self::Item> {
        if self.r >= self.raster.rows() {
            return None;
        }
        let r = self.r;
        self.r += 1;
        Some(self.raster.row(r))
    }
}
